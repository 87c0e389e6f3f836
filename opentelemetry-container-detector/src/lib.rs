//! Container resource detection for OpenTelemetry.
//!
//! # Resource detectors
//!
//! - [`ContainerResourceDetector`] - detect the container ID and runtime from
//!   the environment set up by an NRI runtime plugin.
mod container;

pub use container::{ContainerResourceDetector, CONTAINER_ID_ENV_VAR, CONTAINER_RUNTIME_ENV_VAR};
