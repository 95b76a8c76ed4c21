//! Configuration management.

mod types;

pub use types::{
    Config, LoggingConfig, MissingDependencyPolicy, RuntimeConfig, finsight_home,
};
