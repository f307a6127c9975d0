//! Travai - Thailand travel guide chat client library
//!
//! This library provides the streaming chat client behind the `travai`
//! binary: it sends questions to a guide server, reads the answer as a
//! server-sent event stream, reveals it with a typewriter effect and attaches
//! the guide pages the answer cites.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `citations`: Extraction of the trailing page-citation block
//! - `tool_calls`: Folding of streamed tool-call fragments
//! - `backend`: Guide server abstraction, HTTP client and SSE decoding
//! - `conversation`: Messages, threads and the conversation store
//! - `session`: Typewriter display, stream sessions and the controller
//! - `config`: Configuration management and validation
//! - `credentials`: API key storage in the system keyring
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use travai::backend::HttpBackend;
//! use travai::session::{ControllerSettings, StreamController};
//! use travai::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let backend = HttpBackend::from_config(&config.server, None)?;
//!     let (controller, _events) =
//!         StreamController::new(Arc::new(backend), ControllerSettings::from_config(&config));
//!     let conversation = controller.active_id().await;
//!     let outcome = controller.start(&conversation, "Where is the Grand Palace?").await?.wait().await;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod citations;
pub mod cli;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod credentials;
pub mod error;
pub mod session;
pub mod tool_calls;

// Re-export commonly used types
pub use citations::{extract_citations, Citation, CitationPolicy};
pub use config::Config;
pub use conversation::{ConversationStore, Message, Role};
pub use error::{Result, TravaiError};
pub use session::{ChatEvent, StreamController, TurnOutcome};
pub use tool_calls::{ToolCallAggregator, ToolInvocation};
