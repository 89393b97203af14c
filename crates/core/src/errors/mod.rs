pub mod core;

pub use core::{CoreError, CoreResult};
