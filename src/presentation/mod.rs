// Presentation layer - HTTP adapter for dashboards and operators
pub mod app_state;
pub mod handlers;
