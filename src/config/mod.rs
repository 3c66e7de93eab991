//! Startup configuration: `fieldseal.toml` settings and the master secret.

pub mod secret;
pub mod settings;

pub use secret::{master_key_from_env, master_key_from_str};
pub use settings::Settings;
