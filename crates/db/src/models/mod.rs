//! Row types for the redirect tables.

pub mod permalink;
pub mod redirect;
