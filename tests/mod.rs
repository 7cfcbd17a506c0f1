//! Test suite for tripsync
//!
//! This module organizes all integration and property tests

pub mod integration;
