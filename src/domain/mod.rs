//! Request-scoped data structures shared by the render pipeline.

pub mod assets;
pub mod cache;
pub mod routing;
pub mod selection;
pub mod style;
