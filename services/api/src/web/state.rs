//! services/api/src/web/state.rs
//!
//! Defines the application state shared by every request handler.

use crate::config::Config;
use std::sync::Arc;
use visnovel_core::ports::{DatabaseService, DocumentStore, SummaryService};
use visnovel_core::{ImageChain, Paginator};

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub store: Arc<dyn DocumentStore>,
    pub paginator: Arc<Paginator>,
    /// Condenses page text for image prompts; never fails.
    pub summarizer: Arc<dyn SummaryService>,
    pub image_chain: ImageChain,
}
