pub mod loader;
pub mod schema;

pub use loader::{
    default_settings_path, load_settings, load_settings_from_str, save_settings, CONFIG_PATH_ENV,
};
pub use schema::{expand_tilde, DeployToolConfig, Settings};
