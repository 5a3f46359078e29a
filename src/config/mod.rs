//! Configuration loading
//!
//! Two layers: the audit config file (which repos, branches, and release to
//! audit) and the service settings (endpoints, credentials, cache placement)
//! merged from a settings file and the environment.

pub mod loader;
pub mod settings;

pub use loader::{load_config, AuditConfig};
pub use settings::Settings;
