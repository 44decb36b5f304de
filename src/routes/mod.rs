pub mod connections;
pub mod health;

pub use connections::create_connection_routes;
pub use health::create_health_routes;
