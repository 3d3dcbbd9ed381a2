mod settings;

pub use settings::{user_config_path, AgentConfig, Config};
