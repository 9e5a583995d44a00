//! coachsync writers: translate outbox events into spreadsheet-store
//! creates, updates and deletes.

mod airtable_writer;
mod field_map;
mod references;

pub use airtable_writer::AirtableWriter;
pub use field_map::build_field_map;
pub use references::{ResolvedReferences, resolve_references};
