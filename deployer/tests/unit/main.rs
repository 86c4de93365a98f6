//! Integration tests for the deployer

mod common;
mod test_pipeline;
mod test_run;
mod test_worker;
