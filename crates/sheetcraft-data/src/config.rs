//! Import configuration: header layout, export markers and file-family
//! prefixes.
//!
//! Loaded from `sheetcraft.ron`, `sheetcraft.toml` or `sheetcraft.json`; the
//! format is detected from the extension. Every field has a default, so an
//! empty file (or no file at all) yields [`ImportConfig::default`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::routing::TableFamily;

/// Base name looked up by [`find_config_file`].
pub const CONFIG_BASE_NAME: &str = "sheetcraft";

/// Ordinary sheets need title, type, marker and name rows.
pub const MIN_HEADER_ROWS: usize = 4;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur while loading the import configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Config files in more than one format exist side by side.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// The file parsed but a value is out of range.
    #[error("invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported config file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, ConfigError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(ConfigError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

/// Look for `sheetcraft.{ron,toml,json}` in `dir`.
///
/// Returns `Ok(None)` if none exists and `Err(ConflictingFormats)` if more
/// than one does.
pub fn find_config_file(dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let mut found: Option<PathBuf> = None;

    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{CONFIG_BASE_NAME}.{ext}"));
        if !candidate.exists() {
            continue;
        }
        if let Some(existing) = found {
            return Err(ConfigError::ConflictingFormats {
                a: existing,
                b: candidate,
            });
        }
        found = Some(candidate);
    }

    Ok(found)
}

fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let parse_error = |detail: String| ConfigError::Parse {
        file: path.to_path_buf(),
        detail,
    };

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(e.to_string())),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string())),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(e.to_string())),
    }
}

// ===========================================================================
// ImportConfig
// ===========================================================================

/// Settings shared by every sheet of one import run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Rows before the first data row of an ordinary sheet.
    pub header_rows: usize,
    /// Markers (row 2) that export a field to the client, case-insensitive.
    pub export_markers: Vec<String>,
    /// File-stem prefix of global workbooks.
    pub global_prefix: String,
    /// File-stem prefix of localization workbooks.
    pub localization_prefix: String,
    /// File-stem prefix of files to skip.
    pub ignore_prefix: String,
    /// Ingest workbooks on the rayon thread pool.
    pub parallel: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            header_rows: MIN_HEADER_ROWS,
            export_markers: ["c", "cs", "client", "all"].map(String::from).to_vec(),
            global_prefix: "Global".to_string(),
            localization_prefix: "Lang".to_string(),
            ignore_prefix: "~$".to_string(),
            parallel: true,
        }
    }
}

impl ImportConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = deserialize_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `sheetcraft.*` from `dir`, or the defaults when there is none.
    pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
        match find_config_file(dir)? {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.header_rows < MIN_HEADER_ROWS {
            return Err(ConfigError::Invalid {
                field: "header_rows",
                reason: format!("{} is less than {MIN_HEADER_ROWS}", self.header_rows),
            });
        }
        if self.export_markers.iter().all(|m| m.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "export_markers",
                reason: "no export marker configured".to_string(),
            });
        }
        if self.global_prefix.is_empty() || self.localization_prefix.is_empty() {
            return Err(ConfigError::Invalid {
                field: "global_prefix",
                reason: "family prefixes must not be empty".to_string(),
            });
        }
        if self.global_prefix == self.localization_prefix {
            return Err(ConfigError::Invalid {
                field: "localization_prefix",
                reason: format!("same as global_prefix '{}'", self.global_prefix),
            });
        }
        Ok(())
    }

    /// Whether a header marker exports the field to the client.
    pub fn is_export_marker(&self, marker: &str) -> bool {
        let marker = marker.trim();
        !marker.is_empty()
            && self
                .export_markers
                .iter()
                .any(|m| m.trim().eq_ignore_ascii_case(marker))
    }

    /// The family a workbook belongs to, from its file stem. `None` for
    /// files to skip.
    pub fn family_of(&self, file_name: &str) -> Option<TableFamily> {
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name);

        if !self.ignore_prefix.is_empty() && stem.starts_with(&self.ignore_prefix) {
            None
        } else if stem.starts_with(&self.global_prefix) {
            Some(TableFamily::Global)
        } else if stem.starts_with(&self.localization_prefix) {
            Some(TableFamily::Localization)
        } else {
            Some(TableFamily::Ordinary)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Create a temporary directory with a unique name for test isolation.
    fn make_test_dir(suffix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "sheetcraft_config_test_{suffix}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn cleanup(dir: &Path) {
        let _ = fs::remove_dir_all(dir);
    }

    // -----------------------------------------------------------------------
    // detect_format / find_config_file
    // -----------------------------------------------------------------------

    #[test]
    fn detect_formats() {
        assert_eq!(detect_format(Path::new("a.ron")).unwrap(), Format::Ron);
        assert_eq!(detect_format(Path::new("a.toml")).unwrap(), Format::Toml);
        assert_eq!(detect_format(Path::new("a.json")).unwrap(), Format::Json);
        assert!(matches!(
            detect_format(Path::new("a.yaml")),
            Err(ConfigError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn find_none() {
        let dir = make_test_dir("find_none");
        assert_eq!(find_config_file(&dir).unwrap(), None);
        cleanup(&dir);
    }

    #[test]
    fn find_conflicting() {
        let dir = make_test_dir("conflict");
        fs::write(dir.join("sheetcraft.ron"), "()").unwrap();
        fs::write(dir.join("sheetcraft.json"), "{}").unwrap();

        let result = find_config_file(&dir);
        assert!(matches!(result, Err(ConfigError::ConflictingFormats { .. })));

        cleanup(&dir);
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    #[test]
    fn discover_defaults_without_file() {
        let dir = make_test_dir("defaults");
        assert_eq!(ImportConfig::discover(&dir).unwrap(), ImportConfig::default());
        cleanup(&dir);
    }

    #[test]
    fn load_toml_partial() {
        let dir = make_test_dir("toml");
        fs::write(
            dir.join("sheetcraft.toml"),
            "header_rows = 5\nexport_markers = [\"client\"]\nparallel = false\n",
        )
        .unwrap();

        let config = ImportConfig::discover(&dir).unwrap();
        assert_eq!(config.header_rows, 5);
        assert_eq!(config.export_markers, vec!["client".to_string()]);
        assert!(!config.parallel);
        assert_eq!(config.global_prefix, "Global");

        cleanup(&dir);
    }

    #[test]
    fn load_ron_and_json() {
        let dir = make_test_dir("ron_json");
        let ron_path = dir.join("a.ron");
        fs::write(&ron_path, "(global_prefix: \"Const\")").unwrap();
        assert_eq!(ImportConfig::load(&ron_path).unwrap().global_prefix, "Const");

        let json_path = dir.join("b.json");
        fs::write(&json_path, r#"{"ignore_prefix": "_"}"#).unwrap();
        assert_eq!(ImportConfig::load(&json_path).unwrap().ignore_prefix, "_");

        cleanup(&dir);
    }

    #[test]
    fn load_rejects_bad_values() {
        let dir = make_test_dir("invalid");
        let path = dir.join("sheetcraft.json");
        fs::write(&path, r#"{"header_rows": 2}"#).unwrap();
        assert!(matches!(
            ImportConfig::load(&path),
            Err(ConfigError::Invalid {
                field: "header_rows",
                ..
            })
        ));

        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            ImportConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));

        cleanup(&dir);
    }

    #[test]
    fn load_missing_file_is_io() {
        let result = ImportConfig::load(Path::new("/nonexistent/sheetcraft.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    #[test]
    fn export_markers_case_insensitive() {
        let config = ImportConfig::default();
        assert!(config.is_export_marker("C"));
        assert!(config.is_export_marker(" Client "));
        assert!(config.is_export_marker("ALL"));
        assert!(!config.is_export_marker("s"));
        assert!(!config.is_export_marker(""));
    }

    #[test]
    fn families_by_prefix() {
        let config = ImportConfig::default();
        assert_eq!(config.family_of("Item.xlsx"), Some(TableFamily::Ordinary));
        assert_eq!(config.family_of("GlobalConst.xlsx"), Some(TableFamily::Global));
        assert_eq!(config.family_of("Lang_zh.xlsx"), Some(TableFamily::Localization));
        assert_eq!(config.family_of("~$Item.xlsx"), None);
        assert_eq!(
            config.family_of("data/Global.xlsx"),
            Some(TableFamily::Global)
        );
    }
}
