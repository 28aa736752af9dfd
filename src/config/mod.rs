//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! command line (cli.rs)          config file (TOML, optional)
//!     → Cli::overrides()             → loader.rs (parse & deserialize)
//!            └───────── merge (flags win) ─────────┘
//!     → validation.rs (semantic checks)
//!     → StartupConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require spawning a replacement
//!   process, which re-reads the same file and flags
//! - Validation separates syntactic (serde/clap) from semantic checks

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;

pub use cli::Cli;
pub use loader::{load_config, ConfigError};
pub use schema::{FileConfig, StartupConfig, TlsSettings};
pub use validation::ValidationError;
