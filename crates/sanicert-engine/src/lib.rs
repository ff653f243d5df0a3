//! Certificate processing engine.
//!
//! Wires the extraction boundary, the validation gate, the record store and
//! the artifact generators into one per-item flow:
//!
//! ```text
//! input file ──► extract ──► validate ──► upsert ──► document + sheet
//! ```
//!
//! [`batch::BatchProcessor`] drives this flow over whole directories, with
//! an optional bounded worker pool. Per-item work is independent; the only
//! shared mutable state is the store's critical section and the consolidated
//! sheet's own lock.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use sanicert_model::text::sanitize_for_filename;
use sanicert_model::{Bundle, Certificate, Validator, ORIGIN_MANUAL};
use sanicert_store::{CsvStore, RecordStore};

pub mod batch;
pub mod config;
pub mod extract;
pub mod generate;

pub use batch::{BatchError, BatchProcessor, BatchReport, ItemOutcome};
pub use config::EngineConfig;
pub use extract::{bundle_from_payload, ExtractError, Extractor, JsonExtractor};
pub use generate::{
    ConsolidatedSheetGenerator, DocumentGenerator, HtmlDocumentGenerator, SheetGenerator,
};

/// Result of accepting one bundle: the stored certificate plus the artifact
/// paths produced (or reused) for it.
#[derive(Debug, Clone)]
pub struct ProcessedCertificate {
    pub certificate: Certificate,
    pub document: PathBuf,
    pub sheet: PathBuf,
}

pub struct Engine {
    config: EngineConfig,
    extractor: Box<dyn Extractor>,
    store: Box<dyn RecordStore>,
    documents: Box<dyn DocumentGenerator>,
    sheet: Box<dyn SheetGenerator>,
}

impl Engine {
    /// Build an engine with the default collaborators: JSON extractor,
    /// CSV-backed store, HTML documents and the consolidated CSV sheet.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config
            .ensure_directories()
            .with_context(|| format!("failed to create output dirs under {}", config.output_dir.display()))?;

        let store = CsvStore::open(config.data_dir())?;
        let documents = HtmlDocumentGenerator::new(config.documents_dir());
        let sheet = ConsolidatedSheetGenerator::new(config.sheets_dir());

        Ok(Self {
            config,
            extractor: Box::new(JsonExtractor),
            store: Box::new(store),
            documents: Box::new(documents),
            sheet: Box::new(sheet),
        })
    }

    /// Build an engine from explicit collaborators. Used by tests and by
    /// callers substituting their own extractor or storage backend.
    pub fn with_components(
        config: EngineConfig,
        extractor: Box<dyn Extractor>,
        store: Box<dyn RecordStore>,
        documents: Box<dyn DocumentGenerator>,
        sheet: Box<dyn SheetGenerator>,
    ) -> Self {
        Self {
            config,
            extractor,
            store,
            documents,
            sheet,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn data_dir(&self) -> PathBuf {
        self.config.data_dir()
    }

    /// Extract a bundle from an input document and persist it.
    pub fn process_file(&self, path: &Path) -> Result<ProcessedCertificate> {
        let bundle = self.extractor.extract(path)?;
        self.persist(bundle)
    }

    /// Persist a hand-entered payload. Origin defaults to the
    /// [`ORIGIN_MANUAL`] tag unless the payload names a `source_file`.
    pub fn create_manual(&self, payload: &serde_json::Value) -> Result<ProcessedCertificate> {
        let bundle = bundle_from_payload(payload, ORIGIN_MANUAL)?;
        self.persist(bundle)
    }

    /// Regenerate artifacts for a stored certificate. `None` when no
    /// certificate carries that number.
    pub fn export(&self, certificate_number: &str) -> Result<Option<ProcessedCertificate>> {
        let Some(mut bundle) = self.store.find_by_number(certificate_number)? else {
            return Ok(None);
        };
        if !self.config.skip_validation {
            Validator::validate_bundle(&mut bundle)?;
        }
        let document = self.documents.generate(&bundle)?;
        let sheet = self.sheet.append(&bundle)?;
        Ok(Some(ProcessedCertificate {
            certificate: bundle.certificate,
            document,
            sheet,
        }))
    }

    /// All stored certificates, insertion order.
    pub fn list(&self) -> Result<Vec<Certificate>> {
        Ok(self.store.list()?)
    }

    fn persist(&self, mut bundle: Bundle) -> Result<ProcessedCertificate> {
        let origin = bundle.certificate.source_file.clone();

        // Idempotent re-ingestion: an already-stored origin reuses its
        // artifacts instead of appending a duplicate sheet row.
        if let Some(existing) = self.store.find_by_source(&origin)? {
            tracing::debug!(origin = %origin, "origin already ingested, reusing artifacts");
            let document = match self.find_existing_document(&existing.certificate) {
                Some(path) => path,
                None => self.documents.generate(&existing)?,
            };
            return Ok(ProcessedCertificate {
                certificate: existing.certificate,
                document,
                sheet: self.sheet.consolidated_path().to_path_buf(),
            });
        }

        if !self.config.skip_validation {
            Validator::validate_bundle(&mut bundle)?;
        }

        let stored = self.store.upsert(&bundle, true)?;
        bundle.certificate = stored.clone();

        let document = self.documents.generate(&bundle)?;
        let sheet = self.sheet.append(&bundle)?;

        Ok(ProcessedCertificate {
            certificate: stored,
            document,
            sheet,
        })
    }

    /// Look for a previously generated document for this certificate:
    /// filenames embed the tax id prefix and the certificate number.
    fn find_existing_document(&self, certificate: &Certificate) -> Option<PathBuf> {
        let tax_digits: String = certificate
            .tax_id
            .chars()
            .filter(|c| c.is_ascii_digit())
            .take(8)
            .collect();
        let number = sanitize_for_filename(&certificate.certificate_number);

        let entries = std::fs::read_dir(self.config.documents_dir()).ok()?;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if !tax_digits.is_empty() && name.contains(&tax_digits) && name.contains(&number) {
                return Some(entry.path());
            }
        }
        None
    }
}
