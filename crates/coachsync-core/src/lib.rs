//! coachsync core: shared domain types and ports.
//!
//! This crate defines the records, payloads, and repository/adapter traits
//! that every part of the dual-store synchronization engine depends on. It
//! contains no infrastructure code.

pub mod clock;
pub mod config;
pub mod entity;
pub mod error;
pub mod external;
pub mod fields;
pub mod inbox;
pub mod mapping;
pub mod outbox;
pub mod payload;
pub mod replica;
pub mod repository;
pub mod rng;
