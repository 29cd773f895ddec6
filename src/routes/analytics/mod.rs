mod handler;
pub mod model;

pub use handler::{engagement_split, log_view, most_viewed, overview, views_over_time};
