//! HTTP control surface for Catalyst Live.
//!
//! This crate provides an Axum server that lets a browser frontend drive
//! a simulation worker:
//!
//! - **Run control** (`/start`, `/pause`, `/resume`, `/reset`)
//! - **Data** (`/initial`, `/dynamic`, `/history`)
//! - **Parameter updates** (`/slider`)
//! - **Liveness** (`/health`, `/ready`)
//!
//! # Architecture
//!
//! Handlers hold a [`WorkerController`] and never wait on the worker. Run
//! state changes are applied to shared control state, updates go through
//! a bounded queue that answers 503 when full, and data is read from a
//! single-slot channel the worker overwrites after every batch.
//!
//! [`WorkerController`]: catalyst_core::controller::WorkerController

pub mod error;
pub mod handlers;
pub mod operator;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerConfig, ServerError};
pub use startup::{StartupError, spawn_observer};
pub use state::AppState;
