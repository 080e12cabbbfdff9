pub mod analyzer;
pub mod auth;
pub mod config;
pub mod database;
pub mod domain;
pub mod engine;
pub mod error;
pub mod http_server;
pub mod models;
pub mod report;
pub mod schema;
pub mod store;
pub mod validator;

pub use engine::EquipmentEngine;
pub use error::ServiceError;
pub use http_server::HttpServer;
