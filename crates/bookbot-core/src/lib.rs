//! Core domain + application logic for the ebook catalog bot.
//!
//! This crate is intentionally framework-agnostic. Telegram / HTTP API /
//! Resend live behind ports (traits) implemented in adapter crates.

pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod opds;
pub mod ports;
pub mod store;

pub use errors::{Error, Result};
