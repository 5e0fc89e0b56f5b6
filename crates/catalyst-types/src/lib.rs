//! Shared type definitions for the Catalyst Live simulation server.
//!
//! This crate is the single source of truth for the values that cross the
//! boundary between the simulation worker and the control surface. Types
//! defined here flow downstream to `TypeScript` via `ts-rs` for the
//! browser client.
//!
//! # Modules
//!
//! - [`ids`] -- [`RunId`], the identifier of one simulation trajectory
//! - [`enums`] -- run state, control actions, slider scale
//! - [`structs`] -- frames, data bundles, parameter updates, control responses
//! - [`payload`] -- static metadata served by `GET /initial`

pub mod enums;
pub mod ids;
pub mod payload;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{ControlAction, ParameterScale, WorkerRunState};
pub use ids::RunId;
pub use payload::{
    Coordinate, CoverageLabel, InitialMetadata, PlotMetadata, SliderSpec, TaggedCoordinate,
    TofLabel, TypeDefinition, VisualizationMetadata,
};
pub use structs::{DataBundle, Frame, HealthReport, ParameterSpec, ParameterUpdate, TofValue};
