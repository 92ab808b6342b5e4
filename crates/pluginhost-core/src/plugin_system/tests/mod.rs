pub mod common;
pub mod registry_tests;
