//! Deployer Library
//!
//! Pulls, builds, swaps and restarts a set of products (the deployer itself
//! included) whenever a signed push notification or a manual trigger arrives.

pub mod app;
pub mod cli;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod server;
pub mod storage;
pub mod store;
pub mod utils;
pub mod workers;
