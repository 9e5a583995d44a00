//! coachsync airtable: REST client for the spreadsheet store.

pub mod client;
mod dto;

pub use client::{AirtableClient, AirtableClientError, AirtableConfig, DEFAULT_API_URL};
