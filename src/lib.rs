pub mod auth;
pub mod billing;
pub mod config;
pub mod error;
pub mod extractor;
pub mod import_csv;
pub mod plans;
pub mod routes;
pub mod subscribers;
pub mod usage;
