pub mod audit;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod migrate;
pub mod models;
pub mod publishing;
pub mod routes;
pub mod schema;
pub mod state;
pub mod telemetry;
pub mod tenancy;
pub mod utils;
