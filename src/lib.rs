//! anvil: drives an implementation plan phase by phase through a generation
//! session, checkpointing each phase in version control, and keeps a
//! citation-backed memory of repository facts that feeds task prompts.

pub mod agents;
pub mod anvil_config;
pub mod config;
pub mod errors;
pub mod events;
pub mod memory;
pub mod orchestrator;
pub mod plan;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tracker;
pub mod ui;
pub mod workflow;
