// Domain layer - telemetry types and pure transformations
pub mod device;
pub mod error;
pub mod live_view;
pub mod normalizer;
pub mod sample;
pub mod tracking;
