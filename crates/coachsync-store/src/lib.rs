//! coachsync store: `PostgreSQL` implementations of the sync-state and
//! replica repositories.

pub mod pg_dead_letter_repository;
pub mod pg_inbox_repository;
pub mod pg_mapping_repository;
pub mod pg_outbox_repository;
pub mod pg_replica_repository;
pub mod schema;

pub use pg_dead_letter_repository::PgDeadLetterRepository;
pub use pg_inbox_repository::PgInboxRepository;
pub use pg_mapping_repository::PgMappingRepository;
pub use pg_outbox_repository::{PgOutboxRepository, enqueue_in_transaction};
pub use pg_replica_repository::PgReplicaRepository;
