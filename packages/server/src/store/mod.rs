//! Persistent job storage.

pub mod pg;

pub use pg::PgVideoJobStore;
