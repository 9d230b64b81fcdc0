// Order-book replica and the sync state machine. No I/O lives here.
pub mod book;
pub mod buffer;
pub mod reconciler;
pub mod types;
