//! API Integration Tests

mod auth_tests;
mod health_tests;
mod profile_tests;
mod routing_tests;
