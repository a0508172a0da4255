pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod features;
pub mod fixtures;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

pub use config::Config;
pub use error::{AppError, AppResult};

use utils::mail::Mailer;
use utils::upload::FileStore;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Config,
    pub mailer: Arc<dyn Mailer>,
    pub files: Arc<dyn FileStore>,
}
