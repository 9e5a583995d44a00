//! coachsync reconcile: the full-sync pass from the spreadsheet store into
//! the relational replica.

mod records;
mod sweep;

pub use sweep::{ReconciliationSweep, StepReport, SweepError, SweepReport, SweepStep};
