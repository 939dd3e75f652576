//! Server-side rendering shell for GraphQL-backed single-page applications.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;

mod util;
