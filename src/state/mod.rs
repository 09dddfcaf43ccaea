pub mod app;
pub mod site;
pub mod subscribers;

pub use app::{AppState, StreamSettings};
