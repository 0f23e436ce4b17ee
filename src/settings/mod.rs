//! Settings for opening handles and filtering events.
//!
//! Each settings struct doubles as a set of command-line arguments and a
//! section of the TOML settings file.
//!
//! # Example
//!
//! ```rust
//! use divert::settings::HandleSettings;
//!
//! let settings = HandleSettings {
//!     filter: "udp".into(),
//!     sniff: true,
//!     ..Default::default()
//! };
//! let config = settings.to_config();
//! assert!(config.validate().is_ok());
//! ```

pub mod filter;
pub mod handle;
pub mod store;

// Re-export commonly used types
pub use filter::FilterSettings;
pub use handle::HandleSettings;
pub use store::Settings;
