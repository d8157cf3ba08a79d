// OpenAI-compatible /completions endpoint (single string prompt)

pub mod client;
pub mod wire;

pub use client::{HttpTransport, HttpTransportBuilder, DEFAULT_COMPLETIONS_URL};
pub use wire::{
    CompletionChoice, CompletionRequest, CompletionResponse, StopReason, StreamChoice,
    StreamChunk, StreamOptions, WireUsage,
};
