pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod reservation;
pub mod routes;
pub mod utils;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub use config::Config;
pub use error::{AppError, AppResult};

#[derive(Clone)]
pub struct AppState {
    // Arc because `DatabaseConnection` is not `Clone` when sea-orm's `mock`
    // feature is enabled (it is, via dev-dependencies, for test builds).
    pub db: Arc<DatabaseConnection>,
    pub config: Config,
}
