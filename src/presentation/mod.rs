// Presentation layer - HTTP surface for the dashboard UI
pub mod app_state;
pub mod handlers;
