//! Stored-template lookups for the template kind.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Resolves stored template sources per tenant.
#[async_trait]
pub trait TemplateProvider: Send + Sync {
    /// Fetch a template's source; `None` when the tenant has no template
    /// with that id.
    async fn template(&self, tenant_id: &str, template_id: &str) -> anyhow::Result<Option<String>>;
}

/// In-memory [`TemplateProvider`] for tests and embedded setups.
#[derive(Debug, Default)]
pub struct MemoryTemplateProvider {
    templates: RwLock<HashMap<String, String>>,
}

impl MemoryTemplateProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template source under a tenant.
    pub async fn put(&self, tenant_id: &str, template_id: &str, source: impl Into<String>) {
        self.templates
            .write()
            .await
            .insert(storage_key(tenant_id, template_id), source.into());
    }
}

#[async_trait]
impl TemplateProvider for MemoryTemplateProvider {
    async fn template(&self, tenant_id: &str, template_id: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .templates
            .read()
            .await
            .get(&storage_key(tenant_id, template_id))
            .cloned())
    }
}

fn storage_key(tenant_id: &str, template_id: &str) -> String {
    format!("{}/{}", tenant_id, template_id)
}
