//! Integration tests for the collection pipeline
//!
//! These tests use wiremock to stand in for search engines and robots.txt
//! hosts, driving the scheduler, gate, throttle, and tracker end to end.

mod collect_tests;
