pub mod event_stream;
pub mod pubsub_service;
pub mod site_service;
