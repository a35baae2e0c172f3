//! `JobStore` implementations.

pub mod memory;
pub mod pg;

pub use memory::InMemoryJobStore;
pub use pg::PgJobStore;
