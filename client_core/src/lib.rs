//! HTTP clients around the narration pipeline: the OpenAI speech provider
//! used by the server, and the consumer-side client for the streaming
//! endpoint.

pub mod narration;
pub mod openai;

pub use narration::{NarrationClient, VoiceInfo};
pub use openai::{OpenAiSpeech, OpenAiSpeechConfig};
