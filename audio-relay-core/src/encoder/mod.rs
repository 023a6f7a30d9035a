pub mod chunk_encoder;
pub mod pcm_codec;
