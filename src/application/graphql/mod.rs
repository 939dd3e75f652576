//! GraphQL data-fetching client: transport links, operations and the
//! cache-backed client handed to the render pass.

mod client;
mod document;
mod link;
mod operation;

pub use client::{ClientEnvironment, ClientOptions, GraphQlClient, create_client};
pub use link::{
    Credentials, ErrorLink, GraphQlError, GraphQlResponse, HttpLink, Link, LinkError,
    SourceLocation,
};
pub use document::{DocumentError, OperationKind, ParsedOperation, parse_operation};
pub use operation::Operation;
