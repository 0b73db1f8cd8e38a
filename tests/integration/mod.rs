//! Integration test suite for taskweave.
//!
//! These tests drive whole workflows through the engine, the planner and
//! the submission service using scripted workers and canned reasoning
//! replies.
//!
//! # Test Categories
//!
//! - `scenarios`: Fan-in, cycles, partial failure, unknown workers, timeouts
//! - `engine_behavior`: Wave ordering, concurrency and failure policies
//! - `planning`: Objective to result through the planner and service
//!
//! # CI Compatibility
//!
//! No test calls a real reasoning service.

mod fixtures;

mod engine_behavior;
mod planning;
mod scenarios;
