use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use tracing::debug;

use crate::engine::book::Book;
use crate::engine::reconciler::SharedBook;
use crate::engine::types::{Depth, PriceLevel};
use crate::market_data::supervisor::ConnectionStatus;

pub type ObserverId = u64;

type BookCallback = Arc<dyn Fn() + Send + Sync>;
type StatusCallback = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

#[derive(Default)]
struct Observers {
    next_id: ObserverId,
    book: Vec<(ObserverId, BookCallback)>,
    status: Vec<(ObserverId, StatusCallback)>,
}

impl Observers {
    fn next_id(&mut self) -> ObserverId {
        self.next_id += 1;
        self.next_id
    }
}

/// Read-only handle on the replica for display code.
///
/// Every read takes the book's read lock, so a reader sees either the state
/// before or after an apply, never one in progress. Change callbacks carry no
/// payload; call the read methods from inside them to pull current state.
#[derive(Clone)]
pub struct BookView {
    book: SharedBook,
    observers: Arc<Mutex<Observers>>,
    status: Arc<RwLock<ConnectionStatus>>,
}

impl BookView {
    pub fn new(book: SharedBook) -> Self {
        Self {
            book,
            observers: Arc::new(Mutex::new(Observers::default())),
            status: Arc::new(RwLock::new(ConnectionStatus::Connecting)),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.book.read().is_valid()
    }

    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.book.read().best_bid()
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.book.read().best_ask()
    }

    pub fn spread(&self) -> Option<Decimal> {
        self.book.read().spread()
    }

    pub fn top_n(&self, n: usize) -> Depth {
        self.book.read().top_n(n)
    }

    /// Top `n` levels, or `None` while the book is mid-resync.
    pub fn valid_depth(&self, n: usize) -> Option<Depth> {
        let book = self.book.read();
        book.is_valid().then(|| book.top_n(n))
    }

    pub fn last_update_id(&self) -> u64 {
        self.book.read().last_update_id()
    }

    /// Run `f` against one consistent state of the book.
    pub fn read<R>(&self, f: impl FnOnce(&Book) -> R) -> R {
        f(&self.book.read())
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    pub fn on_book_change(&self, f: impl Fn() + Send + Sync + 'static) -> ObserverId {
        let mut obs = self.observers.lock();
        let id = obs.next_id();
        obs.book.push((id, Arc::new(f)));
        id
    }

    pub fn on_status(&self, f: impl Fn(ConnectionStatus) + Send + Sync + 'static) -> ObserverId {
        let mut obs = self.observers.lock();
        let id = obs.next_id();
        obs.status.push((id, Arc::new(f)));
        id
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut obs = self.observers.lock();
        let before = obs.book.len() + obs.status.len();
        obs.book.retain(|(i, _)| *i != id);
        obs.status.retain(|(i, _)| *i != id);
        before != obs.book.len() + obs.status.len()
    }

    pub(crate) fn notify_book_change(&self) {
        // snapshot the list so callbacks may (un)subscribe
        let callbacks: Vec<BookCallback> = self.observers.lock().book.iter().map(|(_, f)| Arc::clone(f)).collect();
        for f in callbacks {
            f();
        }
    }

    /// Record a new connection status; observers only hear about changes.
    pub(crate) fn set_status(&self, status: ConnectionStatus) -> bool {
        {
            let mut current = self.status.write();
            if *current == status {
                return false;
            }
            *current = status;
        }
        debug!(?status, "Connection status changed");
        let callbacks: Vec<StatusCallback> = self.observers.lock().status.iter().map(|(_, f)| Arc::clone(f)).collect();
        for f in callbacks {
            f(status);
        }
        true
    }
}
