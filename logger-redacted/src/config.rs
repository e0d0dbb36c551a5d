// Logger configuration
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_level")]
    pub level: String,

    /// Emit JSON lines instead of the human formatter
    #[serde(default)]
    pub json: bool,

    /// Include file and line numbers in human output
    #[serde(default)]
    pub with_location: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            with_location: false,
        }
    }
}

impl LoggerConfig {
    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.level = "debug".to_string();
            self.with_location = true;
        }
        self
    }

    pub fn json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}
