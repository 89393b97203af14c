pub mod environment;
pub mod project;

pub use environment::*;
pub use project::*;
