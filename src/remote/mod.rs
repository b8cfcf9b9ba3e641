pub mod client;
pub mod queries;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SyncError;

pub use client::GithubClient;

/// The transport seam. One GraphQL operation per call; the implementation
/// classifies failures but never retries — callers decide.
#[async_trait]
pub trait GraphQl: Send + Sync {
    async fn execute(&self, query: &str, variables: Value) -> Result<Value, SyncError>;
}
