//! Persistence and aggregation layer for classcheck.
//!
//! Stores batches, students and attendance sessions as JSON documents behind
//! a small key/value contract, and derives per-student, per-session and
//! per-month statistics from them.

pub mod aggregator;
pub mod repository;
pub mod store;
