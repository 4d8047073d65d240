pub mod requestor;

pub use requestor::*;
