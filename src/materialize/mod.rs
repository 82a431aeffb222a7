/// Docker-backed materialization.
mod docker;
/// The content materializer abstraction and archive extraction.
mod materializer;

pub use docker::*;
pub use materializer::*;
