//! KleinValue — LLM fair-value estimates for marketplace listings
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod error;
pub mod llm;
pub mod settings;
pub mod storage;
pub mod types;
