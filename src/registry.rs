//! Site registry: descriptors are registered on a mutable [`Site`], then frozen into an immutable
//! [`Registry`] that routes and URL reversal read from.

use crate::config::validate_descriptor;
use crate::error::ConfigError;
use crate::resource::ResourceDescriptor;
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_SITE_NAME: &str = "backbone";

pub struct Site {
    name: String,
    mount_path: String,
    base_url: Option<String>,
    resources: Vec<ResourceDescriptor>,
}

/// `"api/"` -> `"/api"`, `"/"` -> `""`.
fn normalize_mount(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

impl Default for Site {
    fn default() -> Self {
        Site::new(DEFAULT_SITE_NAME)
    }
}

impl Site {
    pub fn new(name: impl Into<String>) -> Self {
        Site {
            name: name.into(),
            mount_path: String::new(),
            base_url: None,
            resources: Vec::new(),
        }
    }

    pub fn with_mount_path(mut self, path: &str) -> Self {
        self.mount_path = normalize_mount(path);
        self
    }

    /// Scheme and host prefixed to `Location` headers, e.g. `https://shop.example`.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    /// Registering the same route twice keeps the first descriptor.
    pub fn register(&mut self, descriptor: ResourceDescriptor) -> &mut Self {
        if self.is_registered(descriptor.app_label(), descriptor.slug()) {
            tracing::warn!(resource = %descriptor.name(), "already registered, ignoring");
        } else {
            self.resources.push(descriptor);
        }
        self
    }

    pub fn unregister(&mut self, app_label: &str, slug: &str) -> Option<ResourceDescriptor> {
        let pos = self
            .resources
            .iter()
            .position(|r| r.app_label() == app_label && r.slug() == slug)?;
        Some(self.resources.remove(pos))
    }

    pub fn is_registered(&self, app_label: &str, slug: &str) -> bool {
        self.resources
            .iter()
            .any(|r| r.app_label() == app_label && r.slug() == slug)
    }

    /// Validate every descriptor and build the read-only registry.
    pub fn freeze(self) -> Result<Registry, ConfigError> {
        let mut index = HashMap::new();
        let mut resources = Vec::with_capacity(self.resources.len());
        for descriptor in self.resources {
            validate_descriptor(&descriptor)?;
            let key = (descriptor.app_label().to_string(), descriptor.slug().to_string());
            index.insert(key, resources.len());
            tracing::debug!(resource = %descriptor.name(), "registered");
            resources.push(Arc::new(descriptor));
        }
        Ok(Registry {
            name: self.name,
            mount_path: self.mount_path,
            base_url: self.base_url,
            resources,
            index,
        })
    }
}

pub struct Registry {
    name: String,
    mount_path: String,
    base_url: Option<String>,
    resources: Vec<Arc<ResourceDescriptor>>,
    index: HashMap<(String, String), usize>,
}

impl Registry {
    /// URL namespace, used as the `ns:` prefix in [`Registry::reverse`].
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mount_path(&self) -> &str {
        &self.mount_path
    }

    pub fn resource(&self, app_label: &str, slug: &str) -> Option<&Arc<ResourceDescriptor>> {
        self.index
            .get(&(app_label.to_string(), slug.to_string()))
            .map(|i| &self.resources[*i])
    }

    pub fn resources(&self) -> impl Iterator<Item = &Arc<ResourceDescriptor>> {
        self.resources.iter()
    }

    /// `{app}_{slug}` for the collection, `{app}_{slug}_detail` for a record.
    pub fn url_name(&self, resource: &ResourceDescriptor, detail: bool) -> String {
        let base = format!("{}_{}", resource.app_label(), resource.slug());
        if detail {
            format!("{}_detail", base)
        } else {
            base
        }
    }

    pub fn collection_path(&self, resource: &ResourceDescriptor) -> String {
        format!("{}/{}/{}", self.mount_path, resource.app_label(), resource.slug())
    }

    pub fn detail_path(&self, resource: &ResourceDescriptor, id: i64) -> String {
        format!("{}/{}", self.collection_path(resource), id)
    }

    /// Value for the `Location` header of a created record.
    pub fn detail_url(&self, resource: &ResourceDescriptor, id: i64) -> String {
        let path = self.detail_path(resource, id);
        match &self.base_url {
            Some(base) => format!("{}{}", base, path),
            None => path,
        }
    }

    /// Path for a URL name, optionally namespaced (`backbone:shop_product_detail`). Detail names
    /// need an id; collection names must not get one.
    pub fn reverse(&self, name: &str, id: Option<i64>) -> Option<String> {
        let local = match name.split_once(':') {
            Some((ns, local)) if ns == self.name => local,
            Some(_) => return None,
            None => name,
        };
        self.resources.iter().find_map(|r| match id {
            Some(id) if self.url_name(r, true) == local => Some(self.detail_path(r, id)),
            None if self.url_name(r, false) == local => Some(self.collection_path(r)),
            _ => None,
        })
    }
}
