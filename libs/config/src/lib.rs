//! # Switchyard Configuration
//!
//! Settings for the broker, its workers, priority channels and logging,
//! plus the loader that layers TOML files and `SWITCHYARD_*` environment
//! variables.
//!
//! ## Usage
//!
//! ```rust
//! use router_config::RouterConfig;
//!
//! let config = RouterConfig::from_toml_str(r#"
//! [[workers]]
//! name = "poller"
//! consumers = ["store"]
//!
//! [[workers]]
//! name = "store"
//! "#).unwrap();
//!
//! assert_eq!(config.worker("poller").unwrap().consumers, ["store"]);
//! ```

pub mod error;
pub mod logging;
pub mod router_config;
pub mod settings;

// Re-export commonly used types
pub use error::ConfigError;
pub use logging::{init_logging, init_router_logging};
pub use router_config::{load_config, RouterConfig};
pub use settings::{
    BrokerSettings, ChannelSettings, JournalFilter, JournalSettings, LogFormat, LoggingSettings,
    WorkerSettings,
};
