pub mod config;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::Configuration;
pub use state::AppState;
