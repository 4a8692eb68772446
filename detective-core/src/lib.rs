//! Murder-mystery detective game engine.
//!
//! This crate provides:
//! - A persisted session store with atomic patch merges
//! - A command dispatcher driving the case lifecycle
//! - A streaming coordinator that shows progress while text is generated
//! - Star ratings, achievements and statistics
//!
//! # Quick Start
//!
//! ```ignore
//! use detective_core::{Dispatcher, HttpGenerator, SessionStore, StreamingCoordinator, SystemClock};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let coordinator = StreamingCoordinator::new(Arc::new(my_sink));
//! let dispatcher = Dispatcher::new(Arc::new(HttpGenerator::new()), coordinator, Arc::new(SystemClock));
//! let mut store = SessionStore::in_memory();
//!
//! let response = dispatcher.execute("new_case", &mut store, &CancellationToken::new()).await;
//! println!("{}", response.text);
//! ```

pub mod case;
pub mod clock;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod generation;
pub mod handlers;
pub mod model;
pub mod offline;
pub mod prompts;
pub mod scoring;
pub mod store;
pub mod testing;

// Primary public API
pub use clock::{Clock, SystemClock};
pub use commands::{Command, CommandError};
pub use config::AppConfig;
pub use coordinator::{Frame, OutputSink, StreamingCoordinator};
pub use dispatcher::{Action, DispatchError, Dispatcher, Response};
pub use generation::{GenerationError, Generator, HttpGenerator};
pub use model::{CaseState, Difficulty, GameSession, GenerationConfig};
pub use offline::OfflineGenerator;
pub use store::{FileStorage, MemoryStorage, SessionPatch, SessionStore, Storage, StoreError};
pub use testing::{MockGenerator, RecordingSink, TestHarness};
