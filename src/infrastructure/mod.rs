pub mod cache;
pub mod channel;
pub mod persistence;
