//! # relay-bridge: Frame Relay Host
//!
//! Runs a `PipelineController` in the foreground: connects to the frame
//! producer's socket, renders every frame that survives backpressure and
//! periodically logs the pipeline stats.

pub mod bridge;
pub mod config;
