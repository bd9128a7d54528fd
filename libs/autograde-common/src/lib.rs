pub mod config;
pub mod events;
pub mod results;
pub mod types;
