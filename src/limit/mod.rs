//! Transaction admission control and token-bucket state.

mod bucket;
mod controller;

pub use bucket::TokenBucket;
pub use controller::{Admission, TransactionClass, TransactionLimiter};
