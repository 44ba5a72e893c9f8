pub mod execution;
pub mod repository;

pub use execution::*;
pub use repository::*;
