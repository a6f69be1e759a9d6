// ⚙️ Pipeline Configuration
// Every field has a default matching the Câmara dos Deputados open-data export,
// so an empty TOML file (or no file at all) is a valid configuration.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// TOP-LEVEL CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub csv: CsvFormat,
    pub roster: RosterConfig,
    pub analysis: AnalysisConfig,
    pub output: OutputConfig,
}

impl PipelineConfig {
    /// Load from a TOML file. Missing sections fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::io(format!("reading config {}", path.display()), e))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, PipelineError> {
        let config: PipelineConfig = toml::from_str(text).map_err(|e| PipelineError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let csv = &self.csv;
        if csv.decimal_separator == csv.thousands_separator {
            return Err(PipelineError::Config {
                message: format!(
                    "decimal and thousands separators must differ (both '{}')",
                    csv.decimal_separator
                ),
            });
        }
        csv.delimiter_byte()?;
        if encoding_rs::Encoding::for_label(csv.encoding.as_bytes()).is_none() {
            return Err(PipelineError::Config {
                message: format!("unknown encoding label '{}'", csv.encoding),
            });
        }
        if let Some(fallback) = &csv.fallback_encoding {
            if encoding_rs::Encoding::for_label(fallback.as_bytes()).is_none() {
                return Err(PipelineError::Config {
                    message: format!("unknown fallback encoding label '{}'", fallback),
                });
            }
        }
        if self.analysis.top_n == 0 {
            return Err(PipelineError::Config {
                message: "analysis.top_n must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// CSV FORMAT
// ============================================================================

/// How the expense file is laid out and encoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvFormat {
    pub delimiter: char,
    pub decimal_separator: char,
    pub thousands_separator: char,
    /// WHATWG encoding label tried first
    pub encoding: String,
    /// Tried once if the primary decode fails. `None` disables the retry.
    pub fallback_encoding: Option<String>,
    pub columns: ColumnMap,
}

impl Default for CsvFormat {
    fn default() -> Self {
        CsvFormat {
            delimiter: ';',
            decimal_separator: ',',
            thousands_separator: '.',
            encoding: "utf-8".to_string(),
            fallback_encoding: Some("windows-1252".to_string()),
            columns: ColumnMap::default(),
        }
    }
}

impl CsvFormat {
    /// Plain `,`-delimited, `.`-decimal layout
    pub fn comma_separated() -> Self {
        CsvFormat {
            delimiter: ',',
            decimal_separator: '.',
            thousands_separator: ',',
            ..CsvFormat::default()
        }
    }

    /// Delimiter as the single byte the csv reader wants
    pub fn delimiter_byte(&self) -> Result<u8, PipelineError> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| PipelineError::Config {
                message: format!(
                    "delimiter '{}' must be a single ASCII character",
                    self.delimiter
                ),
            })
    }
}

/// Source column names for the three fields the pipeline keeps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub payee: String,
    pub category: String,
    pub amount: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        ColumnMap {
            payee: "txNomeParlamentar".to_string(),
            category: "txtDescricao".to_string(),
            amount: "vlrLiquido".to_string(),
        }
    }
}

// ============================================================================
// ROSTER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Fixed delay between attempts
    pub retry_delay_ms: u64,
    pub user_agent: String,
    /// Sent as `itens=N` when set
    pub page_size: Option<u32>,
    pub follow_pagination: bool,
    pub max_pages: u32,
}

impl Default for RosterConfig {
    fn default() -> Self {
        RosterConfig {
            base_url: "https://dadosabertos.camara.leg.br/api/v2".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            retry_delay_ms: 2000,
            user_agent: format!("expense-recon/{}", env!("CARGO_PKG_VERSION")),
            page_size: None,
            follow_pagination: true,
            max_pages: 50,
        }
    }
}

// ============================================================================
// ANALYSIS + OUTPUT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub top_n: usize,
    pub percentage_decimals: u32,
    /// Rounding applied when rendering tables
    pub round_decimals: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            top_n: 20,
            percentage_decimals: 2,
            round_decimals: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Also export every table into `<run_dir>/results.db`
    pub sqlite: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            dir: PathBuf::from("results"),
            sqlite: false,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_default() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.csv.delimiter, ';');
        assert_eq!(config.csv.columns.amount, "vlrLiquido");
        assert_eq!(config.analysis.top_n, 20);
    }

    #[test]
    fn test_partial_override() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [csv]
            delimiter = ","
            decimal_separator = "."
            thousands_separator = ","

            [csv.columns]
            payee = "name"

            [roster]
            max_retries = 1

            [analysis]
            top_n = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.csv.delimiter, ',');
        assert_eq!(config.csv.columns.payee, "name");
        assert_eq!(config.csv.columns.category, "txtDescricao");
        assert_eq!(config.roster.max_retries, 1);
        assert_eq!(config.roster.timeout_secs, 30);
        assert_eq!(config.analysis.top_n, 5);
    }

    #[test]
    fn test_rejects_identical_separators() {
        let err = PipelineConfig::from_toml_str(
            r#"
            [csv]
            decimal_separator = "."
            thousands_separator = "."
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));
    }

    #[test]
    fn test_rejects_unknown_encoding() {
        let err = PipelineConfig::from_toml_str(
            r#"
            [csv]
            encoding = "klingon-8"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("klingon-8"));
    }

    #[test]
    fn test_delimiter_byte_rejects_non_ascii() {
        let format = CsvFormat {
            delimiter: '¦',
            ..CsvFormat::default()
        };
        assert!(matches!(format.delimiter_byte(), Err(PipelineError::Config { .. })));
        assert_eq!(CsvFormat::default().delimiter_byte().unwrap(), b';');
    }

    #[test]
    fn test_rejects_zero_top_n() {
        let err = PipelineConfig::from_toml_str("[analysis]\ntop_n = 0\n").unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));
    }
}
