pub mod auth;
pub mod config;
pub mod connections;
pub mod database;
pub mod error;
pub mod events;
pub mod health;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod test_utils;

pub use config::Config;
pub use server::Server;
