// Binance USD-M futures adapter: diff depth websocket + REST depth snapshot

use futures::StreamExt;
use reqwest::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument};

use super::binance_types::{RestDepthSnapshot, RestError};
use super::{DepthFeed, FrameStream, SnapshotSource};
use crate::engine::types::Snapshot;
use crate::error::{SyncError, SyncResult};
use crate::market_data::normaliser::Normaliser;

pub struct BinanceFutures {
    pub symbol: String,       // e.g. "BTCUSDT"
    pub rest_base: String,    // "https://fapi.binance.com"
    pub ws_base: String,      // "wss://fstream.binance.com/ws"
    pub update_speed: String, // "100ms", "250ms" or "500ms"
    client: reqwest::Client,
    normaliser: Normaliser,
}

impl BinanceFutures {
    pub fn new(symbol: &str, rest_base: &str, ws_base: &str, update_speed: &str) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("depth-replica/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            symbol: symbol.to_ascii_uppercase(),
            rest_base: rest_base.trim_end_matches('/').to_string(),
            ws_base: ws_base.trim_end_matches('/').to_string(),
            update_speed: update_speed.to_string(),
            client,
            normaliser: Normaliser::new(symbol),
        })
    }

    pub fn ws_url(&self) -> String {
        let stream = format!("{}@depth", self.symbol.to_ascii_lowercase());
        if self.update_speed.is_empty() {
            format!("{}/{}", self.ws_base, stream)
        } else {
            format!("{}/{}@{}", self.ws_base, stream, self.update_speed)
        }
    }

    pub fn snapshot_url(&self, symbol: &str, limit: u32) -> String {
        format!(
            "{}/fapi/v1/depth?symbol={}&limit={}",
            self.rest_base,
            symbol.to_ascii_uppercase(),
            limit
        )
    }
}

/// Map a non-success REST response onto the error taxonomy.
pub fn classify_http_error(status: StatusCode, body: &str) -> SyncError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
        return SyncError::RateLimited { status: status.as_u16() };
    }
    if status.is_client_error() {
        if let Ok(err) = serde_json::from_str::<RestError>(body) {
            return SyncError::Exchange { code: err.code, msg: err.msg };
        }
    }
    SyncError::Network(format!("http {status}"))
}

#[async_trait::async_trait]
impl DepthFeed for BinanceFutures {
    #[instrument(skip(self), fields(symbol = %self.symbol))]
    async fn connect(&self) -> SyncResult<FrameStream> {
        let url = self.ws_url();
        let (ws, response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        info!(url = %url, status = %response.status(), "Connected to depth stream");

        // Pongs are queued by tungstenite and flushed on the next read.
        let frames = ws.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Depth stream closed by server");
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(SyncError::from(e))),
            }
        });
        Ok(frames.boxed())
    }
}

#[async_trait::async_trait]
impl SnapshotSource for BinanceFutures {
    #[instrument(skip(self))]
    async fn depth_snapshot(&self, symbol: &str, limit: u32) -> SyncResult<Snapshot> {
        let resp = self.client.get(self.snapshot_url(symbol, limit)).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(classify_http_error(status, &body));
        }
        let raw: RestDepthSnapshot = serde_json::from_str(&body)?;
        debug!(last_update_id = raw.last_update_id, bids = raw.bids.len(), asks = raw.asks.len(), "Fetched depth snapshot");
        self.normaliser.snapshot(raw)
    }
}
