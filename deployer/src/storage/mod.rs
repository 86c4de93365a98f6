//! Settings and secrets

pub mod settings;
pub mod variables;
