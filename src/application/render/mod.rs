//! Page rendering pipeline.
//!
//! A render runs in two passes: every operation the page declares is
//! prefetched into the per-request client cache, then the component tree
//! renders synchronously against that cache. The resulting markup, the
//! collected styles and the extracted cache state are assembled into one
//! HTML document.

mod app;
mod service;
mod state;

pub use app::{App, Location, RenderScope};
pub use service::{
    ClientFactory, HttpClientFactory, PageRequest, RenderConfig, RenderedPage, Renderer,
};
pub use state::{STATE_GLOBAL, inline_css, serialize_state};
