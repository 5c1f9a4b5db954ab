//! TOML-based settings for DDAS.
//!
//! Settings are loaded from `~/.ddas/settings.toml` with environment variable
//! interpolation support. The credential keeps working from the environment
//! alone through the `get_with_env_fallback` helper.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ddas_lib::settings::SettingsManager;
//!
//! let manager = SettingsManager::new().await?;
//! let settings = manager.get().await;
//! let token = manager.auth_token().await;
//! let config = settings.orchestrator_config(token);
//! ```

pub mod loader;
pub mod schema;

pub use loader::{get_with_env_fallback, settings_path, SettingsManager};
pub use schema::DdasSettings;
