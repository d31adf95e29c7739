//! Wrapp Config provides the resolved environment handed to a bring-up run.
//!
//! Components read it through `environment` injections (raw values addressed by key)
//! and `computed` injections (the whole provider, including typed configs).
//!
//! # Examples
//!
//! ```rust
//! use wrapp_config::provider::ConfigProvider;
//!
//! #[derive(Clone)]
//! struct AppConfig {
//!     host: String,
//!     port: u16,
//! }
//!
//! let mut config_provider = ConfigProvider::new()
//!     .with_value("API_TOKEN", "secret")
//!     .with_value("CACHE_URL", "redis://localhost");
//!
//! config_provider
//!     .add_config(AppConfig {
//!         host: "localhost".to_string(),
//!         port: 8080,
//!     })
//!     .unwrap();
//!
//! assert_eq!(config_provider.value("API_TOKEN"), Some("secret"));
//! let app_config = config_provider.require_config::<AppConfig>().unwrap();
//! assert_eq!(app_config.port, 8080);
//! ```
//!
//! Wrapp Config consists of the following components:
//!
//! 1. Provider - for loading raw values and registering typed configs
//! 2. Errors - for config errors

pub mod errors;
pub mod provider;

pub use errors::{GetConfigError, RegisterConfigError};
pub use provider::ConfigProvider;
