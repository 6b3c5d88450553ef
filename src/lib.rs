pub mod config;
pub mod error;
pub mod flows;
pub mod identity;
pub mod model;
pub mod server;
pub mod store;
