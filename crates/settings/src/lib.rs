//! Configuration store and button mapping lookup for the label bridge.

pub mod config;
pub mod resolver;

pub use config::{
    AppConfig, AreaConfig, ConfigError, ConfigStore, DEFAULT_CONFIG_FILE,
    DEFAULT_PRINT_TIMEOUT_SECS, DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT,
};
pub use resolver::{MappingResolver, ReloadingResolver, ResolveError};
