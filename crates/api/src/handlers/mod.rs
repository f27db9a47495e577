pub mod delivery;
pub mod redirects;
