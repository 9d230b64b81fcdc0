// Scripted feed and snapshot source shared by the async tests.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;
use parking_lot::Mutex;

use crate::engine::types::Snapshot;
use crate::error::{SyncError, SyncResult};
use crate::market_data::adapters::{DepthFeed, FrameStream, SnapshotSource};

pub type Script = SyncResult<Vec<SyncResult<String>>>;

/// Each `connect` pops one scripted connection; once the script runs out the
/// connection stays open and silent.
pub struct ScriptedFeed {
    connections: Mutex<VecDeque<Script>>,
}

impl ScriptedFeed {
    pub fn new(connections: Vec<Script>) -> Self {
        Self { connections: Mutex::new(connections.into()) }
    }
}

#[async_trait::async_trait]
impl DepthFeed for ScriptedFeed {
    async fn connect(&self) -> SyncResult<FrameStream> {
        let next = self.connections.lock().pop_front();
        match next {
            Some(Ok(frames)) => Ok(futures::stream::iter(frames).boxed()),
            Some(Err(e)) => Err(e),
            None => Ok(futures::stream::pending::<SyncResult<String>>().boxed()),
        }
    }
}

/// Hands out scripted snapshot results in order, then network errors.
pub struct ScriptedSource {
    results: Mutex<VecDeque<SyncResult<Snapshot>>>,
    pub calls: AtomicU64,
}

impl ScriptedSource {
    pub fn new(results: Vec<SyncResult<Snapshot>>) -> Self {
        Self { results: Mutex::new(results.into()), calls: AtomicU64::new(0) }
    }
}

#[async_trait::async_trait]
impl SnapshotSource for ScriptedSource {
    async fn depth_snapshot(&self, _symbol: &str, _limit: u32) -> SyncResult<Snapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.results.lock().pop_front();
        next.unwrap_or_else(|| Err(SyncError::Network("script exhausted".into())))
    }
}

pub fn depth_frame(first: u64, last: u64, pu: u64, bids: &str, asks: &str) -> String {
    format!(
        r#"{{"e":"depthUpdate","E":1,"T":1,"s":"BTCUSDT","U":{first},"u":{last},"pu":{pu},"b":{bids},"a":{asks}}}"#
    )
}
