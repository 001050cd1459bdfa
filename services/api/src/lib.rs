//! services/api/src/lib.rs
//!
//! The API service crate: configuration, the PostgreSQL and notification
//! adapters, and the web layer that exposes the booking engine.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
