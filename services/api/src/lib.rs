//! services/api/src/lib.rs
//!
//! The service crate: concrete adapters behind the core's ports, the
//! session-scoped data layer, the due-item scheduler, the public sharing
//! projection, and the HTTP surface.

pub mod adapters;
pub mod config;
pub mod error;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod sharing;
pub mod web;
