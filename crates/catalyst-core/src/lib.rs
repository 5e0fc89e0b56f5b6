//! Worker loop, channels, and control protocol for Catalyst Live.
//!
//! This crate owns everything between the HTTP control surface and a
//! kinetic Monte Carlo engine: the paced simulation worker, the bounded
//! parameter queue, the overwrite-on-publish data slot, the rolling frame
//! history, and the run control state machine.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `catalyst-config.yaml`.
//! - [`model`] -- Static model description and observable ordering.
//! - [`engine`] -- [`SimulationEngine`] and [`EngineFactory`] traits.
//! - [`frame`] -- Frame snapshot builder.
//! - [`history`] -- Fixed-capacity frame window.
//! - [`catalog`] -- Parameter catalog and update validation.
//! - [`channel`] -- Parameter queue and data slot.
//! - [`operator`] -- Run control state and transitions.
//! - [`worker`] -- The paced simulation loop.
//! - [`controller`] -- [`WorkerController`], the handle used by the control surface.
//! - [`initial`] -- The `GET /initial` document.
//! - [`merge`] -- Recursive JSON object union.
//! - [`error`] -- Control and worker error types.
//!
//! [`SimulationEngine`]: engine::SimulationEngine
//! [`EngineFactory`]: engine::EngineFactory
//! [`WorkerController`]: controller::WorkerController

pub mod catalog;
pub mod channel;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod frame;
pub mod history;
pub mod initial;
pub mod merge;
pub mod model;
pub mod operator;
pub mod worker;
