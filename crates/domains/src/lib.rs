//! # domains
//!
//! Entity model, failure taxonomy and port traits for the fitness social
//! engagement engine. Nothing in here performs I/O.

pub mod clock;
pub mod dto;
pub mod error;
pub mod feed;
pub mod ids;
pub mod likes;
pub mod models;
pub mod ports;

// Re-exporting for easier access in other crates
pub use clock::*;
pub use dto::*;
pub use error::*;
pub use feed::*;
pub use ids::*;
pub use likes::*;
pub use models::*;
pub use ports::*;
