use serde::Serialize;

pub mod analytics;
pub mod artwork;
pub mod auth;
pub mod portfolio;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
