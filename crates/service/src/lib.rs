pub mod chat;
pub mod config;
pub mod conversations;
pub mod error;
pub mod generate;
pub mod ingest;
pub mod registry;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use state::AppState;
