pub mod app;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod infra;
pub mod logging;
pub mod metrics;
pub mod parser;
pub mod pipeline;
pub mod storage;
pub mod strategies;
pub mod types;
pub mod validation;
