use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::{debug, instrument, trace};

use crate::engine::types::{Depth, DiffEvent, PriceLevel, Snapshot};

/// Local replica of the exchange's aggregated book.
///
/// Both sides are price -> quantity maps. Bids are read back to front so the
/// best bid comes first; asks are read front to back. No zero-quantity level is
/// ever stored.
///
/// The replica does no sequence checking of its own. Whoever calls
/// [`Book::apply_diff`] has already decided the event is the next one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Book {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    last_update_id: u64,
    valid: bool,
}

impl Book {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace both sides wholesale. Leaves the book invalid until an anchoring
    /// diff confirms continuity.
    #[instrument(level = "debug", skip_all, fields(last_update_id = s.last_update_id))]
    pub fn apply_snapshot(&mut self, s: &Snapshot) {
        self.bids = collect_side(&s.bids);
        self.asks = collect_side(&s.asks);
        self.last_update_id = s.last_update_id;
        self.valid = false;
        debug!(bids = self.bids.len(), asks = self.asks.len(), "Applied snapshot");
    }

    /// Merge one diff into the book and advance the cursor to its final id.
    #[instrument(level = "trace", skip_all, fields(u = d.final_update_id))]
    pub fn apply_diff(&mut self, d: &DiffEvent) {
        merge_side(&mut self.bids, &d.bid_updates);
        merge_side(&mut self.asks, &d.ask_updates);
        self.last_update_id = d.final_update_id;
        trace!(bids = self.bids.len(), asks = self.asks.len(), "Applied diff");
    }

    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.iter().next_back().map(|(p, q)| PriceLevel::new(*p, *q))
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.iter().next().map(|(p, q)| PriceLevel::new(*p, *q))
    }

    pub fn spread(&self) -> Option<Decimal> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        Some(ask.price - bid.price)
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        Some((bid.price + ask.price) / Decimal::TWO)
    }

    /// First `n` levels of each side in sort order.
    pub fn top_n(&self, n: usize) -> Depth {
        Depth {
            bids: self.bids().take(n).collect(),
            asks: self.asks().take(n).collect(),
        }
    }

    /// Bids from best (highest) to worst.
    pub fn bids(&self) -> impl Iterator<Item = PriceLevel> + '_ {
        self.bids.iter().rev().map(|(p, q)| PriceLevel::new(*p, *q))
    }

    /// Asks from best (lowest) to worst.
    pub fn asks(&self) -> impl Iterator<Item = PriceLevel> + '_ {
        self.asks.iter().map(|(p, q)| PriceLevel::new(*p, *q))
    }

    pub fn bid_depth(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_depth(&self) -> usize {
        self.asks.len()
    }

    pub fn last_update_id(&self) -> u64 {
        self.last_update_id
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }
}

fn collect_side(levels: &[PriceLevel]) -> BTreeMap<Decimal, Decimal> {
    levels
        .iter()
        .filter(|l| !l.is_removal())
        .map(|l| (l.price, l.quantity))
        .collect()
}

fn merge_side(side: &mut BTreeMap<Decimal, Decimal>, updates: &[PriceLevel]) {
    for level in updates {
        if level.is_removal() {
            side.remove(&level.price);
        } else {
            side.insert(level.price, level.quantity);
        }
    }
}
