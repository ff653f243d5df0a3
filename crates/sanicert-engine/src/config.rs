//! Engine configuration: where the store and the derived artifacts live.

use std::path::{Path, PathBuf};

/// Output layout and processing switches for an [`crate::Engine`].
///
/// Everything lives under one output root:
///
/// ```text
/// results/
/// ├── data/        store backing files
/// ├── documents/   per-certificate HTML documents
/// ├── sheets/      consolidated tabular output
/// └── logs/
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub output_dir: PathBuf,
    pub data_subdir: String,
    pub documents_subdir: String,
    pub sheets_subdir: String,
    pub logs_subdir: String,
    /// Bypass the validation gate entirely. Structurally-present but
    /// semantically-invalid data will be accepted and stored.
    pub skip_validation: bool,
    /// Input extensions the batch processor picks up (lowercase, no dot).
    pub extensions: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("results"),
            data_subdir: "data".to_string(),
            documents_subdir: "documents".to_string(),
            sheets_subdir: "sheets".to_string(),
            logs_subdir: "logs".to_string(),
            skip_validation: false,
            extensions: vec!["json".to_string()],
        }
    }
}

impl EngineConfig {
    pub fn with_output_dir(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.output_dir.join(&self.data_subdir)
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.output_dir.join(&self.documents_subdir)
    }

    pub fn sheets_dir(&self) -> PathBuf {
        self.output_dir.join(&self.sheets_subdir)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.output_dir.join(&self.logs_subdir)
    }

    /// Create every output directory. Safe to call repeatedly.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [
            self.data_dir(),
            self.documents_dir(),
            self.sheets_dir(),
            self.logs_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .is_some_and(|e| self.extensions.iter().any(|known| known == &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_hang_off_the_output_root() {
        let config = EngineConfig::with_output_dir("/tmp/out");
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/out/data"));
        assert_eq!(config.documents_dir(), PathBuf::from("/tmp/out/documents"));
        assert_eq!(config.sheets_dir(), PathBuf::from("/tmp/out/sheets"));
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let config = EngineConfig::default();
        assert!(config.matches_extension(Path::new("a.json")));
        assert!(config.matches_extension(Path::new("a.JSON")));
        assert!(!config.matches_extension(Path::new("a.xlsx")));
        assert!(!config.matches_extension(Path::new("no-extension")));
    }
}
