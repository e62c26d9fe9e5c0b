pub mod data;
pub mod public;
