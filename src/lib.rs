pub mod api;
pub mod config;
pub mod db;
pub mod queue;
pub mod store;
pub mod sync;
pub mod thumbnail;
