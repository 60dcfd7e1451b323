//! # Polychat — multi-provider LLM streaming fan-out
//!
//! One prompt and a list of model ids go in; one unified SSE event stream
//! comes out, fed concurrently by every requested provider. Each model runs
//! as an independent branch with its own timeout, safety ceiling, and error
//! classification; the outbound stream terminates exactly once no matter
//! which branches fail.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use polychat::config::StreamConfig;
//! use polychat::context::NoopContext;
//! use polychat::coordinator::Coordinator;
//! use polychat::credentials::EnvCredentialResolver;
//! use polychat::providers::AdapterRegistry;
//! use polychat::server::{router, AppState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = Arc::new(AdapterRegistry::with_defaults(reqwest::Client::new()));
//!     let coordinator = Arc::new(Coordinator::new(
//!         registry,
//!         Arc::new(EnvCredentialResolver),
//!         Arc::new(NoopContext),
//!         Arc::new(NoopContext),
//!         Arc::new(NoopContext),
//!         StreamConfig::default(),
//!     ));
//!     let app = router(AppState::new(coordinator));
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3001").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]

pub mod branch;
pub mod catalog;
pub mod completion;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod credentials;
pub mod driver;
pub mod error;
pub mod events;
pub mod providers;
pub mod retry;
pub mod sender;
pub mod server;

pub use branch::{BranchState, ModelBranch};
pub use completion::CompletionManager;
pub use config::{RetrySettings, StreamConfig};
pub use coordinator::{Coordinator, StreamRequest};
pub use driver::{drive_branch, BranchOutcome};
pub use error::{classify, Classification, ErrorKind, StreamError};
pub use events::StreamEvent;
pub use providers::{
    AdapterRegistry, BranchContext, ChunkStream, ProviderAdapter, ProviderChunk, ProviderId,
};
pub use sender::EventSender;
