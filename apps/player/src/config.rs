use std::{collections::HashMap, fs};

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".into(),
        }
    }
}

/// Defaults, then `player.toml`, then environment variables, last one
/// wins. All keys are optional.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("player.toml") {
        apply_file_config(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("SERVER_URL") {
        settings.server_url = v;
    }
    if let Ok(v) = std::env::var("APP__SERVER_URL") {
        settings.server_url = v;
    }

    settings
}

fn apply_file_config(settings: &mut Settings, raw: &str) {
    if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) {
        if let Some(v) = file_cfg.get("server_url") {
            settings.server_url = v.clone();
        }
    }
}
