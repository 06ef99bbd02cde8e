mod loader;
mod odgt;

pub use loader::Loader;
pub use odgt::*;
