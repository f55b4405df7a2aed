//! Service plumbing shared by Atelier HTTP services.

pub mod config;
pub mod error;
pub mod health;
pub mod middleware;
pub mod serde;
pub mod tracing;
