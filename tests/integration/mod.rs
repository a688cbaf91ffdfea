//! Integration tests for the index service

pub mod creation_test;
pub mod teardown_test;
