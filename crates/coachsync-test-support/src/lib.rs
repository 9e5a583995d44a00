//! Shared test fakes and deterministic utilities for coachsync.

mod clock;
mod external;
mod replica;
mod repository;
mod rng;

pub use clock::{FixedClock, ManualClock, fixed_now};
pub use external::{ExternalCall, InMemoryExternalStore};
pub use replica::{InMemoryReplica, ReplicaSnapshot};
pub use repository::{FailingSyncStore, InMemorySyncStore};
pub use rng::{MockRng, SequenceRng};
