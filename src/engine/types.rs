use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Bid,
    Ask,
}

// A single (price, quantity) pair. Zero quantity in an update means "remove".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }

    pub fn is_removal(&self) -> bool {
        self.quantity.is_zero()
    }
}

impl From<(Decimal, Decimal)> for PriceLevel {
    fn from((price, quantity): (Decimal, Decimal)) -> Self {
        Self { price, quantity }
    }
}

// Full point-in-time book from the REST endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub last_update_id: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

// Incremental depth update from the stream.
// `prev_final_update_id` (pu) is the `final_update_id` of the previous event on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEvent {
    pub first_update_id: u64,
    pub final_update_id: u64,
    pub prev_final_update_id: u64,
    pub bid_updates: Vec<PriceLevel>,
    pub ask_updates: Vec<PriceLevel>,
}

impl DiffEvent {
    /// True when this event's id range covers `id`.
    pub fn straddles(&self, id: u64) -> bool {
        self.first_update_id <= id && id <= self.final_update_id
    }
}

// Top of book for display: first n levels of each side in sort order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Depth {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}
