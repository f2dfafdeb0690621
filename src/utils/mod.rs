pub mod error;
pub mod price;

pub use error::{AppError, ErrorClass, Result};
pub use price::{absolute_url, extract_price, extract_price_opt};
