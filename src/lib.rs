//! Ghost Pirates Coordinator Library
//!
//! Multi-agent coordination core: agent lifecycle management through the
//! orchestrator and dependency-aware plan execution, with persistence
//! adapters and a thin HTTP binding.

pub mod agents;
pub mod api;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod orchestrator;
pub mod planning;
