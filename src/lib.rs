pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod filter;
pub mod output;
pub mod printer;
pub mod record;
pub mod selector;
pub mod time;

pub use error::{ObserveError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
