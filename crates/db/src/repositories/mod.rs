//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod permalink_repo;
pub mod redirect_repo;

pub use permalink_repo::PermalinkRepo;
pub use redirect_repo::RedirectRepo;
