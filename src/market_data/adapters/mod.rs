// Shared traits for venue adapters
use futures::stream::BoxStream;

use crate::engine::types::Snapshot;
use crate::error::SyncResult;

/// Raw text frames of one stream connection. The stream ends when the
/// connection closes; an `Err` item is a transport failure.
pub type FrameStream = BoxStream<'static, SyncResult<String>>;

#[async_trait::async_trait]
pub trait DepthFeed: Send + Sync {
    // Open a fresh subscription to the depth-update stream.
    async fn connect(&self) -> SyncResult<FrameStream>;
}

#[async_trait::async_trait]
pub trait SnapshotSource: Send + Sync {
    // One REST call, no rate limiting of its own.
    async fn depth_snapshot(&self, symbol: &str, limit: u32) -> SyncResult<Snapshot>;
}

pub mod binance;
pub mod binance_types;
