mod handler;
mod model;

pub(crate) use handler::invalid_input;
pub use handler::{login, logout, signup};
