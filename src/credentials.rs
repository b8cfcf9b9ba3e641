use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::TenantConfig;
use crate::error::SyncError;

/// Supplies a decrypted bearer token for one tenant. Credential storage and
/// encryption live outside the engine; the token is used for a single client
/// and never persisted or logged here.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self, tenant: &str) -> Result<String, SyncError>;
}

/// Config-file-backed token lookup used by the binary.
pub struct ConfigTokens {
    tokens: HashMap<String, String>,
}

impl ConfigTokens {
    pub fn new(tenants: &[TenantConfig]) -> Self {
        let tokens = tenants
            .iter()
            .map(|t| (t.name.clone(), t.token.clone()))
            .collect();
        Self { tokens }
    }
}

#[async_trait]
impl TokenSource for ConfigTokens {
    async fn token(&self, tenant: &str) -> Result<String, SyncError> {
        self.tokens.get(tenant).cloned().ok_or_else(|| {
            SyncError::Configuration(format!("no API token configured for tenant {tenant}"))
        })
    }
}
