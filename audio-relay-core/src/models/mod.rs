pub mod chunk;
pub mod config;
pub mod consumer;
pub mod error;
pub mod message;
pub mod source;
pub mod state;
