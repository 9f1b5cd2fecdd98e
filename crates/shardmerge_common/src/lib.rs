//! Shared value model, error types and configuration for the shardmerge
//! result-merge engine.

pub mod config;
pub mod datum;
pub mod error;
pub mod types;
