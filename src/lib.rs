pub mod analysis;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod pricing;
pub mod table;
pub mod types;
