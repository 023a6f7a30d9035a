pub mod chunk_codec;
pub mod consumer_port;
pub mod media_buffer;
pub mod media_source;
pub mod relay_delegate;
pub mod source_inspector;
