pub mod api;
pub mod auth;
pub mod db;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod schema;
