//! Shared services for clients

mod database;

pub use database::DatabaseService;
