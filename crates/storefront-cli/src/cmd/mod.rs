pub mod publish;
pub mod pull;
pub mod serve;
pub mod status;
