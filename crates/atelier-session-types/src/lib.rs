//! Session contract shared across Atelier services.
//!
//! Provides the `sessionToken` cookie builders and the `SessionContext` extractor that
//! every protected route uses instead of parsing cookies by hand.

pub mod context;
pub mod cookie;
