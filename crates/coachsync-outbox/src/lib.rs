//! coachsync outbox: the outbound half of the replication pipeline.
//!
//! Changes committed in the relational store are enqueued here, claimed by
//! one or more dispatch workers, and handed to an [`OutboxWriter`]. Failures
//! are retried with backoff until they either succeed or are parked as dead
//! letters for an operator to replay.
//!
//! [`OutboxWriter`]: coachsync_core::outbox::OutboxWriter

mod dead_letters;
mod dispatcher;
mod enqueue;

pub use dead_letters::{list_dead_letters, replay_dead_letter};
pub use dispatcher::{DispatchResult, OutboxDispatcher};
pub use enqueue::enqueue_sync_event;
