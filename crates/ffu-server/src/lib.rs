pub mod api;
pub mod config;
pub mod server;
pub mod ws;

pub use server::FleetServer;
