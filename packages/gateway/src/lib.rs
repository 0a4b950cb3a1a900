//! # Scribe Gateway
//!
//! Connects the composition engine to a chat-completions model and exposes
//! generation over HTTP.
//!
//! - [`UpstreamGenerator`]: [`scribe_compose::GenerationService`] backed by a
//!   streaming chat-completions endpoint
//! - [`router`]: `GET /api/health`, `POST /api/generate`, `POST /api/rewrite`

pub mod config;
pub mod prompt;
pub mod routes;
pub mod sse;
pub mod upstream;

pub use config::GatewayConfig;
pub use prompt::{build_prompt, rewrite_prompt};
pub use routes::{router, AppState};
pub use sse::{parse_delta, SseDecoder};
pub use upstream::UpstreamGenerator;
