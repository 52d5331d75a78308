pub mod action;
pub mod config;
pub mod error;
pub mod keys;
pub mod machine;

pub use action::*;
pub use config::Config;
pub use error::*;
pub use machine::*;
