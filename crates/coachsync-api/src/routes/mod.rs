//! Route modules.

pub mod health;
pub mod sync;
pub mod webhooks;
