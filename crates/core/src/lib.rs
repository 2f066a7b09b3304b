pub mod audit_trail;
pub mod catalog;
pub mod config;
pub mod error;
pub mod mutation;
pub mod pagination;
pub mod preferences;
pub mod query_runner;
pub mod row_identity;
pub mod session;
pub mod value;
