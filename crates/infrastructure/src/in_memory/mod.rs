pub mod audit_log;
pub mod catalog;
pub mod job_repository;
pub mod workflow_repository;

pub use audit_log::InMemoryAuditLog;
pub use catalog::{InMemoryInventoryRepository, InMemoryProjectRepository, InMemoryTemplateRepository};
pub use job_repository::InMemoryJobRepository;
pub use workflow_repository::InMemoryWorkflowRepository;
