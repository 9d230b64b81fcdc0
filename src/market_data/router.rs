// Router wires stream, snapshot fetcher and reconciler into one event loop
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use crate::config::Settings;
use crate::engine::reconciler::{Outcome, Reconciler, SyncStats};
use crate::engine::types::Snapshot;
use crate::error::SyncResult;
use crate::market_data::adapters::{DepthFeed, SnapshotSource};
use crate::market_data::book_view::BookView;
use crate::market_data::fetcher::SnapshotFetcher;
use crate::market_data::supervisor::{ConnectionStatus, StreamInput, StreamSupervisor};

const STREAM_CHANNEL: usize = 4096;

/// Keeps one symbol's replica in sync.
///
/// Stream input and snapshot results funnel into a single loop, so the
/// reconciler sees exactly one event at a time. Readers go through
/// [`DepthSync::view`].
pub struct DepthSync<F, S> {
    supervisor: StreamSupervisor<F>,
    fetcher: Arc<SnapshotFetcher<S>>,
    reconciler: Reconciler,
    view: BookView,
}

impl<F, S> DepthSync<F, S>
where
    F: DepthFeed + 'static,
    S: SnapshotSource + 'static,
{
    pub fn new(feed: F, source: S, settings: &Settings) -> Self {
        let reconciler = Reconciler::new(settings.reconciler_config());
        let view = BookView::new(reconciler.book());
        Self {
            supervisor: StreamSupervisor::new(feed, &settings.symbol, settings.reconnect_delay()),
            fetcher: Arc::new(SnapshotFetcher::new(
                source,
                &settings.symbol,
                settings.snapshot_limit,
                settings.snapshot_min_interval(),
            )),
            reconciler,
            view,
        }
    }

    pub fn view(&self) -> BookView {
        self.view.clone()
    }

    /// Run until shutdown is signalled. Only an exchange rejection of the
    /// snapshot request ends the loop with an error.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> SyncResult<SyncStats> {
        let DepthSync { supervisor, fetcher, mut reconciler, view } = self;

        let (stream_tx, mut stream_rx) = mpsc::channel::<StreamInput>(STREAM_CHANNEL);
        let (request_tx, mut request_rx) = mpsc::channel::<()>(1);
        let (snapshot_tx, mut snapshot_rx) = mpsc::channel::<SyncResult<Snapshot>>(1);

        let stream_task = tokio::spawn(supervisor.run(stream_tx, shutdown.clone()));
        let fetch_task = tokio::spawn(async move {
            while request_rx.recv().await.is_some() {
                let result = fetcher.fetch_fresh().await;
                if snapshot_tx.send(result).await.is_err() {
                    break;
                }
            }
        });

        let mut link = ConnectionStatus::Connecting;
        let dispatch = |out: Outcome| {
            if out.request_snapshot && request_tx.try_send(()).is_err() {
                // one request already queued
                info!("Snapshot request already queued");
            }
            if out.book_changed || out.invalidated {
                view.notify_book_change();
            }
        };

        dispatch(reconciler.start());

        let result = loop {
            if *shutdown.borrow() {
                break Ok(());
            }
            tokio::select! {
                Some(input) = stream_rx.recv() => {
                    match input {
                        StreamInput::Diff(d) => dispatch(reconciler.on_diff(d)),
                        StreamInput::Malformed(_) => {
                            reconciler.on_malformed(Instant::now());
                        }
                        StreamInput::Status(s) => link = s,
                    }
                    let status = if link == ConnectionStatus::Connected && reconciler.degraded(Instant::now()) {
                        ConnectionStatus::Degraded
                    } else {
                        link
                    };
                    view.set_status(status);
                }
                Some(fetched) = snapshot_rx.recv() => {
                    match fetched {
                        Ok(s) => dispatch(reconciler.on_snapshot(s)),
                        Err(e) => match reconciler.on_snapshot_failed(&e) {
                            Ok(out) => dispatch(out),
                            Err(fatal) => break Err(fatal),
                        },
                    }
                }
                _ = shutdown.changed() => break Ok(()),
                else => break Ok(()),
            }
        };

        stream_task.abort();
        fetch_task.abort();

        let stats = reconciler.stats().clone();
        match result {
            Ok(()) => {
                info!(?stats, "Depth sync stopped");
                Ok(stats)
            }
            Err(e) => {
                error!(error = %e, "Depth sync aborted");
                Err(e)
            }
        }
    }
}
