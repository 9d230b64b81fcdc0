// Market data module entrypoint
pub mod adapters;    // venue-specific stream + REST clients (Binance futures)
pub mod book_view;   // read-only facade and change observers for consumers
pub mod fetcher;     // rate-limited snapshot fetches
pub mod normaliser;  // converts wire strings -> decimal levels
pub mod router;      // event loop tying stream, fetcher and reconciler together
pub mod supervisor;  // owns the stream connection, reconnects

#[cfg(test)]
pub(crate) mod test_support;
