pub mod bulk;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod output;
pub mod registration;
pub mod validation;

pub use context::HarnessContext;
pub use error::{HarnessError, Result};
