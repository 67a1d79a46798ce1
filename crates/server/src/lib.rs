//! HTTP query surface for the anomaly engine

pub mod api;
pub mod config;
