// File: snapshotter/src/web/mod.rs
pub mod handlers;
pub mod middleware;
pub mod server;

pub use server::{create_router, start_web_server};

use std::sync::Arc;

use crate::database::Database;
use crate::fleet_status::FleetStatus;

// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub status: FleetStatus,
    pub api_token: Arc<String>,
}

impl AppState {
    pub fn new(db: Arc<Database>, status: FleetStatus, api_token: String) -> Self {
        Self {
            db,
            status,
            api_token: Arc::new(api_token),
        }
    }
}
