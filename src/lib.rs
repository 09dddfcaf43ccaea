//! Backend of a small personal website: a visit counter and a single-slot
//! guestbook, with every change pushed live to connected browsers over SSE.

pub mod app;
pub mod config;
pub mod errors;
pub mod events;
pub mod persistence;
pub mod routes;
pub mod services;
pub mod state;

pub use app::build_app;
pub use config::AppConfig;
pub use events::Event;
pub use state::AppState;
