pub mod config;
pub mod health;
pub mod inference;
pub mod routes;
pub mod session;
pub mod state;

pub use routes::configure_routes;
pub use state::AppState;
