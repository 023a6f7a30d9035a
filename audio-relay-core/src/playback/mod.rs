pub mod consumer_endpoint;
pub mod pending_queue;
pub mod reassembler;
