// File: maitri-core/tests/integration/main.rs
//
// These tests need a reachable Postgres instance; see
// test_utils::helpers::setup_test_database for the connection env vars.

mod case_tests;
mod scheduling_tests;
mod token_tests;
