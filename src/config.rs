//! Configuration file support.
//!
//! A TOML file holding run defaults:
//!
//! ```toml
//! threads = 4
//! stream_lines = 128
//! pixel_type = "u8"
//! many_expressions = true
//! ```

use crate::core::error::{BandMathError, BandMathResult};
use crate::core::pixel::PixelType;
use crate::engine::filter::BandMathFilter;
use crate::engine::options::{RunOptions, DEFAULT_STREAM_LINES};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Run defaults read from a TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandMathConfig {
    /// Worker threads (0 = one per core)
    #[serde(default)]
    pub threads: usize,

    /// Lines per streamed region (0 = the whole output at once)
    #[serde(default = "default_stream_lines")]
    pub stream_lines: u32,

    /// Output component type
    #[serde(default)]
    pub pixel_type: PixelType,

    /// Append each expression as its own output instead of replacing
    #[serde(default = "default_true")]
    pub many_expressions: bool,
}

fn default_stream_lines() -> u32 {
    DEFAULT_STREAM_LINES
}

fn default_true() -> bool {
    true
}

impl Default for BandMathConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            stream_lines: DEFAULT_STREAM_LINES,
            pixel_type: PixelType::default(),
            many_expressions: true,
        }
    }
}

impl BandMathConfig {
    /// Load configuration from a file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> BandMathResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)
            .map_err(|e| BandMathError::Config(format!("{}: {}", path.display(), e)))?;
        log::debug!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Parse configuration text.
    pub fn from_toml(content: &str) -> BandMathResult<Self> {
        toml::from_str(content).map_err(|e| BandMathError::Config(e.to_string()))
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> BandMathResult<String> {
        toml::to_string_pretty(self).map_err(|e| BandMathError::Config(e.to_string()))
    }

    /// Run options carrying these defaults.
    pub fn run_options(&self) -> RunOptions {
        RunOptions::new()
            .with_threads(self.threads)
            .with_stream_lines(self.stream_lines)
            .with_pixel_type(self.pixel_type)
    }

    /// Build a filter configured with these defaults.
    pub fn filter<'a>(&self) -> BandMathResult<BandMathFilter<'a>> {
        let mut filter = BandMathFilter::new().with_options(self.run_options());
        filter.set_many_expressions(self.many_expressions)?;
        Ok(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let config = BandMathConfig::from_toml("threads = 2").unwrap();
        assert_eq!(config.threads, 2);
        assert_eq!(config.stream_lines, DEFAULT_STREAM_LINES);
        assert_eq!(config.pixel_type, PixelType::F64);
        assert!(config.many_expressions);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = BandMathConfig {
            threads: 3,
            stream_lines: 0,
            pixel_type: PixelType::U16,
            many_expressions: false,
        };
        let text = config.to_toml().unwrap();
        assert!(text.contains("pixel_type = \"u16\""));
        assert_eq!(BandMathConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_pixel_type() {
        let err = BandMathConfig::from_toml("pixel_type = \"u12\"").unwrap_err();
        assert!(matches!(err, BandMathError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "stream_lines = 16\nmany_expressions = false").unwrap();
        let config = BandMathConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.stream_lines, 16);

        let filter = config.filter().unwrap();
        assert!(!filter.many_expressions());
        assert_eq!(filter.options().stream_lines, 16);
    }
}
