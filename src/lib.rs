// Tabletalk - ask questions about a CSV file through a hosted LLM

pub mod config;
pub mod types;
pub mod models;
pub mod dataset;   // CSV loading and column statistics
pub mod llm;
pub mod agents;
pub mod session;   // Per-client state, history and query dispatch
pub mod routes;
pub mod middleware;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
