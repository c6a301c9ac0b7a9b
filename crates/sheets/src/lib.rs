//! Google Sheets source for the routing table.
//!
//! Reads one tab through the Sheets values API and maps it onto
//! [`courier_routing::SheetRow`]s, authenticating either with a service
//! account (JWT bearer grant) or a plain API key.

pub mod auth;
pub mod client;
pub mod error;

pub use {
    auth::{ServiceAccountAuth, ServiceAccountKey},
    client::{SheetsAuth, SheetsClient, parse_rows},
    error::{Error, Result},
};
