//! Types, traits and plumbing shared across the crate

pub mod channels;
pub mod clock;
pub mod errors;
pub mod traits;
pub mod types;
