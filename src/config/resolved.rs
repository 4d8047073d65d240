//! Resolved config: model metadata built from config, ready to become resource descriptors.

use crate::config::{normalize_label, ResourceConfig};
use crate::error::ConfigError;
use crate::model::{ModelMeta, Record};
use crate::resource::ResourceDescriptor;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct ResolvedConfig {
    models: BTreeMap<String, ModelMeta>,
    resources: Vec<ResourceConfig>,
}

impl ResolvedConfig {
    pub(crate) fn new(models: BTreeMap<String, ModelMeta>, resources: Vec<ResourceConfig>) -> Self {
        ResolvedConfig { models, resources }
    }

    /// Model by label, `app.model`.
    pub fn model(&self, label: &str) -> Option<&ModelMeta> {
        self.models.get(label)
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelMeta> {
        self.models.values()
    }

    /// Computed properties cannot be expressed in JSON; attach them here before building descriptors.
    pub fn attach_property<F>(&mut self, label: &str, name: impl Into<String>, f: F) -> Result<(), ConfigError>
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        let model = self.models.get_mut(label).ok_or_else(|| ConfigError::MissingReference {
            kind: "model",
            id: label.to_string(),
        })?;
        model.add_property(name, f);
        Ok(())
    }

    /// One descriptor per configured resource, with default hooks. Resources of the same model
    /// share one `ModelMeta`.
    pub fn into_descriptors(self) -> Result<Vec<ResourceDescriptor>, ConfigError> {
        let models: BTreeMap<String, Arc<ModelMeta>> = self
            .models
            .into_iter()
            .map(|(label, meta)| (label, Arc::new(meta)))
            .collect();
        self.resources
            .into_iter()
            .map(|r| {
                let label = normalize_label("", &r.model);
                let model = models.get(&label).cloned().ok_or_else(|| ConfigError::MissingReference {
                    kind: "model",
                    id: r.model.clone(),
                })?;
                let mut d = ResourceDescriptor::new(model)
                    .display_fields(r.display_fields)
                    .collection_display_fields(r.collection_display_fields)
                    .detail_display_fields(r.detail_display_fields)
                    .writable_fields(r.fields)
                    .ordering(r.ordering);
                if let Some(size) = r.pagination_size {
                    d = d.pagination_size(size);
                }
                if let Some(slug) = r.url_slug {
                    d = d.url_slug(slug);
                }
                Ok(d)
            })
            .collect()
    }
}
