//! Shared application state.

use std::sync::Arc;

use coachsync_core::clock::Clock;
use coachsync_core::repository::DeadLetterRepository;
use coachsync_reconcile::ReconciliationSweep;
use coachsync_user_sync::UserSync;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Clock for replay timestamps.
    pub clock: Arc<dyn Clock>,
    /// Parked outbox events.
    pub dead_letters: Arc<dyn DeadLetterRepository>,
    /// Fast-lane user sync.
    pub user_sync: Arc<UserSync>,
    /// Full reconciliation sweep.
    pub sweep: Arc<ReconciliationSweep>,
    /// Bearer token for operator endpoints. `None` disables them.
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        dead_letters: Arc<dyn DeadLetterRepository>,
        user_sync: Arc<UserSync>,
        sweep: Arc<ReconciliationSweep>,
        admin_token: Option<String>,
    ) -> Self {
        Self {
            clock,
            dead_letters,
            user_sync,
            sweep,
            admin_token: admin_token.map(Arc::from),
        }
    }
}
