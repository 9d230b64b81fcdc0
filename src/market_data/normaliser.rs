// Convert wire strings into decimal levels and domain events.
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::engine::types::{DiffEvent, PriceLevel, Snapshot};
use crate::error::{SyncError, SyncResult};
use crate::market_data::adapters::binance_types::{RestDepthSnapshot, WsDepthUpdate, WsEnvelope, WsLevel};

const DEPTH_UPDATE: &str = "depthUpdate";

pub struct Normaliser {
    pub symbol: String,
}

impl Normaliser {
    pub fn new(symbol: &str) -> Self {
        Self { symbol: symbol.to_ascii_uppercase() }
    }

    /// Decode one text frame. `Ok(None)` means the frame is not a depth update
    /// for this symbol and should be skipped; `Err` means it could not be read.
    pub fn decode_frame(&self, text: &str) -> SyncResult<Option<DiffEvent>> {
        let mut value: serde_json::Value = serde_json::from_str(text)?;
        if value.get("stream").is_some() && value.get("data").is_some() {
            let envelope: WsEnvelope = serde_json::from_value(value)?;
            value = envelope.data;
        }

        match value.get("e").and_then(|e| e.as_str()) {
            Some(DEPTH_UPDATE) => {}
            _ => return Ok(None),
        }

        let update: WsDepthUpdate = serde_json::from_value(value)?;
        if !update.symbol.is_empty() && !update.symbol.eq_ignore_ascii_case(&self.symbol) {
            return Ok(None);
        }
        self.diff_event(update).map(Some)
    }

    pub fn diff_event(&self, update: WsDepthUpdate) -> SyncResult<DiffEvent> {
        if update.first_update_id > update.final_update_id {
            return Err(SyncError::Malformed(format!(
                "U={} greater than u={}",
                update.first_update_id, update.final_update_id
            )));
        }
        Ok(DiffEvent {
            first_update_id: update.first_update_id,
            final_update_id: update.final_update_id,
            prev_final_update_id: update.prev_final_update_id,
            bid_updates: self.levels(&update.bids)?,
            ask_updates: self.levels(&update.asks)?,
        })
    }

    pub fn snapshot(&self, raw: RestDepthSnapshot) -> SyncResult<Snapshot> {
        Ok(Snapshot {
            last_update_id: raw.last_update_id,
            bids: self.levels(&raw.bids)?,
            asks: self.levels(&raw.asks)?,
        })
    }

    pub fn levels(&self, side: &[WsLevel]) -> SyncResult<Vec<PriceLevel>> {
        side.iter().map(|lvl| self.level(lvl)).collect()
    }

    pub fn level(&self, [px, qty]: &WsLevel) -> SyncResult<PriceLevel> {
        let price = parse_decimal(px)?;
        let quantity = parse_decimal(qty)?;
        if price.is_sign_negative() || quantity.is_sign_negative() {
            return Err(SyncError::Malformed(format!("negative level [{px}, {qty}]")));
        }
        Ok(PriceLevel::new(price, quantity))
    }
}

fn parse_decimal(s: &str) -> SyncResult<Decimal> {
    Decimal::from_str(s).map_err(|e| SyncError::Malformed(format!("bad decimal {s:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const FRAME: &str = r#"{"e":"depthUpdate","E":123456789,"T":123456788,"s":"BTCUSDT","U":157,"u":160,"pu":149,
        "b":[["50000.10","0.010"],["49999.00","0"]],"a":[["50001.5","1.2"]]}"#;

    #[test]
    fn test_decode_depth_update() {
        let n = Normaliser::new("btcusdt");
        let d = n.decode_frame(FRAME).unwrap().unwrap();
        assert_eq!(d.first_update_id, 157);
        assert_eq!(d.final_update_id, 160);
        assert_eq!(d.prev_final_update_id, 149);
        assert_eq!(d.bid_updates[0], PriceLevel::new(dec!(50000.10), dec!(0.010)));
        assert!(d.bid_updates[1].is_removal());
        assert_eq!(d.ask_updates, vec![PriceLevel::new(dec!(50001.5), dec!(1.2))]);
    }

    #[test]
    fn test_decode_combined_envelope() {
        let n = Normaliser::new("BTCUSDT");
        let frame = format!(r#"{{"stream":"btcusdt@depth@100ms","data":{FRAME}}}"#);
        assert!(n.decode_frame(&frame).unwrap().is_some());
    }

    #[test]
    fn test_skips_other_events_and_symbols() {
        let n = Normaliser::new("ETHUSDT");
        assert!(n.decode_frame(FRAME).unwrap().is_none());
        assert!(n.decode_frame(r#"{"result":null,"id":1}"#).unwrap().is_none());
        assert!(n.decode_frame(r#"{"e":"kline","k":{}}"#).unwrap().is_none());
    }

    #[test]
    fn test_malformed_frames() {
        let n = Normaliser::new("BTCUSDT");
        assert!(matches!(n.decode_frame("not json"), Err(SyncError::Malformed(_))));
        let bad_price = FRAME.replace("50000.10", "fifty");
        assert!(matches!(n.decode_frame(&bad_price), Err(SyncError::Malformed(_))));
        let negative = FRAME.replace("1.2", "-1.2");
        assert!(matches!(n.decode_frame(&negative), Err(SyncError::Malformed(_))));
        let missing_pu = FRAME.replace(r#""pu":149,"#, "");
        assert!(matches!(n.decode_frame(&missing_pu), Err(SyncError::Malformed(_))));
        let reversed = FRAME.replace(r#""U":157"#, r#""U":170"#);
        assert!(matches!(n.decode_frame(&reversed), Err(SyncError::Malformed(_))));
    }

    #[test]
    fn test_snapshot_conversion() {
        let n = Normaliser::new("BTCUSDT");
        let raw: RestDepthSnapshot = serde_json::from_str(
            r#"{"lastUpdateId":1027024,"E":1589436922972,"T":1589436922959,
                "bids":[["4.00000000","431.00000000"]],"asks":[["4.00000200","12.00000000"]]}"#,
        )
        .unwrap();
        let s = n.snapshot(raw).unwrap();
        assert_eq!(s.last_update_id, 1027024);
        assert_eq!(s.bids, vec![PriceLevel::new(dec!(4), dec!(431))]);
        assert_eq!(s.asks[0].price, dec!(4.000002));
    }
}
