//! Resource API SDK: descriptor-driven REST resources over record stores.
//!
//! Register [`ResourceDescriptor`]s on a [`Site`], freeze it into a [`Registry`] and mount
//! [`app_router`]. Each request runs through the [`Dispatcher`]: permission hooks, validation,
//! pagination, and field resolution into JSON.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod model;
pub mod pagination;
pub mod registry;
pub mod resolver;
pub mod resource;
pub mod response;
pub mod routes;
pub mod state;
pub mod store;
pub mod validation;

pub use config::{load_from_dir, resolve, FullConfig, ResolvedConfig, Settings};
pub use dispatcher::{ApiRequest, Dispatcher};
pub use error::{ApiError, ConfigError, ConfigurationFault, DispatchError, StoreError};
pub use extractors::CurrentRequestor;
pub use model::{FieldKind, FieldMeta, FieldValue, FieldValues, ModelMeta, Record};
pub use registry::{Registry, Site};
pub use resource::{
    Action, Capabilities, DefaultHooks, FieldSpec, RequestContext, Requestor, ResourceDescriptor, ResourceHooks,
};
pub use response::ApiResponse;
pub use routes::{app_router, common_routes, common_routes_with_ready, resource_routes};
pub use state::AppState;
pub use store::{MemoryStore, PgStore, Queryset, RecordStore};
pub use validation::{FormValidator, ModelForm, ValidationErrors};
