//! Application services layer.

pub mod error;
pub mod graphql;
pub mod render;
