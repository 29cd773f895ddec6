mod handler;
mod model;

pub use handler::{create_portfolio, get_portfolio, my_portfolios};
