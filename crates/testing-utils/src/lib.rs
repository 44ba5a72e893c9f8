//! # Orchestrator Testing Utils
//!
//! Shared testing utilities for the job orchestration workspace.
//!
//! - **Builders**: templates, projects, inventories, workflows, instances and
//!   pre-stated jobs with sensible defaults
//! - **Mock collaborators**: execution launcher and credential resolver doubles
//!
//! ```toml
//! [dev-dependencies]
//! orchestrator-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;
