pub mod client;
pub mod error;
pub mod types;

pub use client::HttpTransferClient;
pub use error::TransferError;
pub use types::{DownloadRequest, UploadRequest};

use async_trait::async_trait;

/// The resource-transfer collaborator.
///
/// Implementations must be safely re-invokable: the orchestrator retries a
/// failed call, so a repeated download or upload of the same object must be
/// idempotent or side-effect-free on repeat.
#[async_trait]
pub trait ResourceTransfer: Send + Sync {
    /// Fetch one resource identified by `key` on behalf of `token`.
    async fn download(&self, token: &str, key: &str) -> Result<(), TransferError>;

    /// Push the produced artifact `local_key` to `remote_url` on behalf of
    /// `token`.
    async fn upload(&self, token: &str, local_key: &str, remote_url: &str)
    -> Result<(), TransferError>;
}
