//! Integration tests for Social-Tide
//!
//! These tests use wiremock to stand in for the remote web surface and run
//! the session, crawler, follow cycle and media pipeline end-to-end.

mod common;
mod follow_tests;
mod media_tests;
