//! langdetect common library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ambient plumbing shared by the langdetect workspace members.
//!
//! # Overview
//!
//! - **Error Handling**: the common error type and result alias
//! - **Environment**: typed lookups of environment variables with defaults
//! - **Logging**: console and log-file setup on top of `tracing`
//!
//! # Example
//!
//! ```no_run
//! use langdetect_common::logging::{init_logging, LogConfig};
//! use tracing::info;
//!
//! fn main() -> langdetect_common::Result<()> {
//!     let config = LogConfig::from_env(LogConfig::default())?;
//!     let _guard = init_logging(&config)?;
//!
//!     info!("ready");
//!     Ok(())
//! }
//! ```

pub mod env;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CommonError, Result};
