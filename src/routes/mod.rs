pub mod event_routes;
pub mod site_routes;
pub mod system_routes;
