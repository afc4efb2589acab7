pub mod api;
pub mod db;
pub mod engine;
pub mod entities;
pub mod error;
pub mod fees;
pub mod flags;
pub mod geofence;
pub mod matching;
pub mod server;
pub mod store;
