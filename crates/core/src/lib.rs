//! Domain logic for the redirect engine: URL canonicalization, the rule
//! builder, request-time resolution, and the save-time consistency checks.
//!
//! Nothing here touches the database; persistence is reached through the
//! traits in [`resolution`].

pub mod bulk;
pub mod chain;
pub mod error;
pub mod geo;
pub mod redirect;
pub mod resolution;
pub mod transfer;
pub mod types;
pub mod url;
