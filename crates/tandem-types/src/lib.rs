pub mod api;
pub mod error;
pub mod events;
pub mod ids;
pub mod models;
