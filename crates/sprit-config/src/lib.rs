//! Site, batch and parameter configuration for SpRIT HVSR processing.
//!
//! Everything is stored as TOML. A [`SiteConfig`] describes one recording
//! with its metadata, responses and processing parameters; a
//! [`BatchConfig`] lists many sites with shared defaults and per-site
//! partial overrides. Validation reports every problem in a file at once.
//!
//! # Example
//!
//! ```rust,no_run
//! use sprit_config::BatchConfig;
//!
//! let batch = BatchConfig::load("survey.toml").unwrap();
//! let resolved = batch.resolve().unwrap();
//! println!("{} sites, {} rejected", resolved.len(), resolved.rejected.len());
//! ```

mod batch;
mod error;
mod site;

/// Platform-specific configuration paths.
pub mod paths;

/// Parameter and site validation.
pub mod validation;

pub use batch::{BatchConfig, BatchSiteConfig, ResolvedBatch};
pub use error::ConfigError;
pub use paths::{
    default_params_path, ensure_user_config_dir, find_config, load_default_params, load_params,
    save_params, user_config_dir,
};
pub use site::{DataConfig, ResponseConfig, SiteConfig};
pub use validation::{
    ValidationError, ValidationResult, validate_params, validate_params_in, validate_site_names,
};
