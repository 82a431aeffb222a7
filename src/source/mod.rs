/// Docker-backed source environment.
mod docker;
/// The source environment abstraction.
mod environment;

pub use docker::*;
pub use environment::*;
