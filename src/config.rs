use std::collections::HashMap;
use std::fs;

use thiserror::Error;

pub const DEFAULT_PARAMS_FILE: &str = "/root/automation/build_params.txt";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line_no}: expected key=value, got '{line}'")]
    MissingSeparator { line_no: usize, line: String },
}

// A missing or malformed parameter file is fatal for the caller, so unlike the
// remote steps this returns an error instead of printing and carrying on.
pub fn load_config(path: &str) -> Result<HashMap<String, String>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut map = HashMap::new();
    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(eq_pos) = line.find('=') else {
            return Err(ConfigError::MissingSeparator {
                line_no: idx + 1,
                line: line.to_string(),
            });
        };
        let key = line[..eq_pos].trim().to_string();
        let value = line[eq_pos + 1..].trim().to_string();
        map.insert(key, value);
    }
    Ok(map)
}
