//! Deployment module

pub mod admission;
pub mod artifact;
pub mod executor;
pub mod fsm;
pub mod pipeline;
pub mod resolver;
pub mod runner;
pub mod signature;
