use std::sync::Arc;

use config::Config;
use database::Store;
use media::MediaHost;

pub mod config;
pub mod database;
pub mod error;
pub mod media;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub media: Arc<dyn MediaHost>,
    pub config: Config,
}
