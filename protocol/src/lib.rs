//! Data model and wire types shared by the parley client crates.

pub mod ids;
pub mod models;

pub use ids::*;
pub use models::*;
