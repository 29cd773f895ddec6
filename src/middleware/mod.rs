mod auth;
mod error_handler;
pub mod rate_limit;
mod upload;

pub use auth::{auth_middleware, optional_auth};
pub use error_handler::log_errors;
pub use rate_limit::{Decision, LimitError, RateLimiter, client_key, rate_limit};
pub use upload::{ArtworkUpload, UploadPolicy};
