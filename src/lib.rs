//! Client SDK for a locally running Osaurus inference server.
//!
//! Osaurus instances announce themselves through shared configuration files on
//! disk rather than a fixed address. This crate finds the most recently
//! updated running instance, builds requests against its OpenAI-compatible
//! HTTP surface, and exposes chat completions in both blocking and streaming
//! form. The crate is organized around a small set of collaborating layers:
//! - [`discovery`] scans the shared-configuration tree and selects a running
//!   instance.
//! - [`config`] carries explicit client configuration (base URL, API key) and
//!   resolves the base URL through an ordered list of strategies.
//! - [`api`] defines the wire payloads: chat requests and responses, streamed
//!   chunks, and model listings.
//! - [`sse`] buffers server-sent-event bytes into complete `data:` lines.
//! - [`client`] ties it together: request construction, the chat-completion
//!   operations, model listing, and the `tweak` rewrite facade.
//!
//! The SDK performs no retries and installs no global state; every operation
//! is a single independent network call.
//!
//! ```no_run
//! use osaurus_client::{Client, ClientConfig};
//!
//! # async fn demo() -> Result<(), osaurus_client::Error> {
//! let client = Client::connect(&ClientConfig::from_env())?;
//! let rewritten = client
//!     .tweak("teh quick brown fox", "llama-3.2-3b-instruct-4bit", "Fix typos.", 0.3)
//!     .await?;
//! # let _ = rewritten;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod sse;

pub use api::{ChatMessage, ModelInfo};
pub use client::{defaults, ChatStream, Client};
pub use config::ClientConfig;
pub use discovery::{discover_latest_running_instance, is_running, ResolvedInstance};
pub use error::Error;
