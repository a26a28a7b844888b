pub mod config;
pub mod types;
pub mod validation;

pub use config::*;
pub use types::*;
pub use validation::*;
