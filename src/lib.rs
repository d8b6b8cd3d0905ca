//! # ailink
//!
//! Provider-agnostic LLM transport layer for security-testing tooling:
//! one trait-shaped surface over local model servers, hosted APIs, and
//! sandboxed CLI agents, with streaming, cancellation, and bounded
//! background execution.
//!
//! ## Architecture Overview
//!
//! - **[`llm`]**: the [`LlmClient`] trait, per-backend adapters, the
//!   construction [`factory`](llm::factory), SigV4 signing and AWS
//!   credential resolution
//! - **[`chat`]**: conversation history with bounded retention and
//!   change listeners
//! - **[`config`]**: backend selection and per-backend settings with
//!   pre-flight validation
//! - **[`exec`]**: fixed-width worker pool so LLM calls never saturate
//!   the host
//! - **[`env`]**: process-environment and filesystem conventions
//!   (AWS variable names, CLI PATH extensions)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ailink::{LlmSettings, Provider, llm};
//!
//! # async fn run() {
//! let settings = LlmSettings {
//!     active_provider: Provider::Ollama,
//!     ..LlmSettings::default()
//! };
//! let client = llm::create_client(&settings, llm::factory::default_http_client());
//! let completion = client.complete("Summarize this finding.", None).await;
//! # let _ = completion;
//! # }
//! ```
//!
//! Streaming callers implement [`StreamSink`] and pass it to
//! [`LlmClient::chat_streaming`]; backends without native streaming
//! deliver the full response as a single chunk.

pub mod chat;
pub mod config;
pub mod env;
pub mod exec;
pub mod llm;

pub use chat::{ChatMessage, ConversationHistory, Role};
pub use config::{LlmSettings, Provider};
pub use exec::{PoolError, WorkerPool};
pub use llm::{Completion, LlmClient, LlmError, StreamEvent, StreamSink, create_client};
