// Application layer - use cases and collaborator seams
pub mod live_metrics_service;
pub mod session_store;
pub mod telemetry_repository;
