//! Devlink console - main library
//!
//! Shared pieces of the `devlink_console` binary, kept in a library so they
//! can be tested.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (config, CLI, logging)
//! - **devlink**: Session library (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use devlink_console::bin_common::{load_config_from_env, ConfigType, ConsoleConfig};
//! use devlink_console::devlink::Session;
//! ```

// Re-export workspace libraries for convenience
pub use devlink;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod config;
    pub mod console;
    pub mod logging;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
    pub use config::{ConsoleConfig, DecoderKind};
    pub use console::ConsoleCommand;
    pub use logging::init_tracing;
}
