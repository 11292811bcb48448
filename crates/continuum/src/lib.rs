//! Continuum - Multi-level, surprise-gated associative memory
//!
//! This crate provides an in-process memory engine built from tiered
//! stores with independent update cadences, similarity-based retrieval,
//! and a feedback-driven consolidation policy. Three pre-configured
//! specializations back code-completion ranking, conversational context
//! retrieval, and automation-scenario parameter tuning.

pub mod config;
pub mod domains;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod testing;

pub use error::ContinuumError;
pub use memory::cms::ContinuumMemorySystem;
