// Source: https://binance-docs.github.io/apidocs/futures/en/#diff-book-depth-streams
use serde::Deserialize;

// Levels arrive as ["price", "qty"] string pairs
pub type WsLevel = [String; 2];

#[derive(Debug, Deserialize)]
pub struct WsDepthUpdate {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E", default)]
    pub event_time: u64,
    #[serde(rename = "T", default)]
    pub transaction_time: u64,
    #[serde(rename = "s", default)]
    pub symbol: String,
    #[serde(rename = "U")]
    pub first_update_id: u64,
    #[serde(rename = "u")]
    pub final_update_id: u64,
    #[serde(rename = "pu")]
    pub prev_final_update_id: u64,
    #[serde(rename = "b")]
    pub bids: Vec<WsLevel>,
    #[serde(rename = "a")]
    pub asks: Vec<WsLevel>,
}

// Combined streams (/stream?streams=...) wrap the payload
#[derive(Debug, Deserialize)]
pub struct WsEnvelope {
    pub stream: String,
    pub data: serde_json::Value,
}

// REST GET /fapi/v1/depth
#[derive(Debug, Deserialize)]
pub struct RestDepthSnapshot {
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,
    #[serde(rename = "E", default)]
    pub message_time: u64,
    #[serde(rename = "T", default)]
    pub transaction_time: u64,
    pub bids: Vec<WsLevel>,
    pub asks: Vec<WsLevel>,
}

// Error body, e.g. {"code":-1121,"msg":"Invalid symbol."}
#[derive(Debug, Deserialize)]
pub struct RestError {
    pub code: i64,
    pub msg: String,
}
