use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, instrument};

use crate::engine::types::Snapshot;
use crate::error::SyncResult;
use crate::market_data::adapters::SnapshotSource;

/// Rate-limited access to the REST snapshot endpoint.
///
/// At most one request is issued per `min_interval`, no matter how often
/// callers ask. Callers are serialized, so a request in flight is never
/// duplicated.
pub struct SnapshotFetcher<S> {
    source: S,
    symbol: String,
    limit: u32,
    min_interval: Duration,
    state: Mutex<FetchState>,
}

#[derive(Default)]
struct FetchState {
    last_request: Option<Instant>,
    last_snapshot: Option<Snapshot>,
    requests: u64,
}

impl<S: SnapshotSource> SnapshotFetcher<S> {
    pub fn new(source: S, symbol: &str, limit: u32, min_interval: Duration) -> Self {
        Self {
            source,
            symbol: symbol.to_ascii_uppercase(),
            limit,
            min_interval,
            state: Mutex::new(FetchState::default()),
        }
    }

    /// Latest snapshot. Inside the rate window this is the one already fetched;
    /// a request is only issued once the window has passed.
    #[instrument(level = "debug", skip(self), fields(symbol = %self.symbol))]
    pub async fn fetch(&self) -> SyncResult<Snapshot> {
        let mut state = self.state.lock().await;
        if let Some(at) = state.last_request {
            let opens = at + self.min_interval;
            if Instant::now() < opens {
                if let Some(snapshot) = &state.last_snapshot {
                    debug!(last_update_id = snapshot.last_update_id, "Within rate window, reusing snapshot");
                    return Ok(snapshot.clone());
                }
                sleep_until(opens).await;
            }
        }
        self.request(&mut state).await
    }

    /// Always issues a new request, waiting for the rate window to open first.
    #[instrument(level = "debug", skip(self), fields(symbol = %self.symbol))]
    pub async fn fetch_fresh(&self) -> SyncResult<Snapshot> {
        let mut state = self.state.lock().await;
        if let Some(at) = state.last_request {
            sleep_until(at + self.min_interval).await;
        }
        self.request(&mut state).await
    }

    pub async fn requests_issued(&self) -> u64 {
        self.state.lock().await.requests
    }

    async fn request(&self, state: &mut FetchState) -> SyncResult<Snapshot> {
        state.last_request = Some(Instant::now());
        state.requests += 1;
        metrics::counter!("depth_replica_snapshot_requests_total").increment(1);
        match self.source.depth_snapshot(&self.symbol, self.limit).await {
            Ok(snapshot) => {
                state.last_snapshot = Some(snapshot.clone());
                Ok(snapshot)
            }
            Err(e) => {
                state.last_snapshot = None;
                Err(e)
            }
        }
    }
}
