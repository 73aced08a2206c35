pub mod client;
pub mod sse;

pub use client::{ChatClient, ChatContext, SensorContext, StreamEnd, StreamSummary};
pub use sse::{SseDecoder, SseEvent};
