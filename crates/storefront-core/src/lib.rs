pub mod catalog;
pub mod config;
pub mod error;
pub mod kv;
pub mod publish;

pub use error::{Result, StorefrontError};
