//! TOML configuration for the `promo` binary and the HTTP server.
//!
//! ```toml
//! [db]
//! path = "./data/promo.sqlite"
//!
//! [import]
//! sample_rows = 5
//! max_concurrent_files = 3
//! error_display_limit = 20
//! # delimiter = ";"
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    /// Rows echoed back in an analysis preview.
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
    /// Upper bound on files processed at once by a batch import.
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,
    /// Row-level error messages shown in a summary; the audit list is uncapped.
    #[serde(default = "default_error_display_limit")]
    pub error_display_limit: usize,
    /// Forces a delimiter instead of sniffing one from the header line.
    #[serde(default)]
    pub delimiter: Option<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            sample_rows: default_sample_rows(),
            max_concurrent_files: default_max_concurrent_files(),
            error_display_limit: default_error_display_limit(),
            delimiter: None,
        }
    }
}

fn default_sample_rows() -> usize {
    5
}
fn default_max_concurrent_files() -> usize {
    3
}
fn default_error_display_limit() -> usize {
    20
}

impl ImportConfig {
    /// The configured delimiter as a single byte, if any.
    pub fn delimiter_byte(&self) -> Option<u8> {
        self.delimiter.as_deref().and_then(parse_delimiter)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// Configuration used when no file is available (e.g. `promo analyze`).
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/promo.sqlite"),
            },
            import: ImportConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Accepts a literal single character or the names `tab`, `comma`,
/// `semicolon`, `pipe`.
pub fn parse_delimiter(raw: &str) -> Option<u8> {
    match raw {
        "tab" | "\\t" | "\t" => Some(b'\t'),
        "comma" => Some(b','),
        "semicolon" => Some(b';'),
        "pipe" => Some(b'|'),
        s if s.len() == 1 && s.is_ascii() => s.bytes().next(),
        _ => None,
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.import.max_concurrent_files == 0 {
        anyhow::bail!("import.max_concurrent_files must be > 0");
    }

    if config.import.sample_rows == 0 {
        anyhow::bail!("import.sample_rows must be > 0");
    }

    if let Some(ref d) = config.import.delimiter {
        if parse_delimiter(d).is_none() {
            anyhow::bail!(
                "import.delimiter must be a single ASCII character or one of tab, comma, semicolon, pipe (got '{}')",
                d
            );
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("promo.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_config(&dir, "[db]\npath = \"x.sqlite\"\n");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.import.sample_rows, 5);
        assert_eq!(cfg.import.max_concurrent_files, 3);
        assert_eq!(cfg.import.error_display_limit, 20);
        assert_eq!(cfg.server.bind, "127.0.0.1:7341");
        assert_eq!(cfg.import.delimiter_byte(), None);
    }

    #[test]
    fn rejects_zero_concurrency() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "[db]\npath = \"x.sqlite\"\n[import]\nmax_concurrent_files = 0\n",
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("max_concurrent_files"));
    }

    #[test]
    fn rejects_bad_delimiter() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "[db]\npath = \"x.sqlite\"\n[import]\ndelimiter = \"::\"\n",
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn named_delimiters() {
        assert_eq!(parse_delimiter("tab"), Some(b'\t'));
        assert_eq!(parse_delimiter(";"), Some(b';'));
        assert_eq!(parse_delimiter("pipe"), Some(b'|'));
        assert_eq!(parse_delimiter("ab"), None);
    }
}
