//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;

use studydesk_core::ports::{DocumentStore, IdentityProvider};

use crate::config::Config;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all
/// handlers. Per-user state is derived per request from the verified
/// identity; nothing user-specific lives here.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub config: Arc<Config>,
}
