//! Domain records for sanitation-treatment certificates.
//!
//! The three linked record kinds:
//! - [`Certificate`] — the parent record, one per processed document,
//! - [`ChemicalProduct`] — ordered child list of products applied,
//! - [`ApplicationMethod`] — ordered child list of application methods.
//!
//! A [`Bundle`] groups one certificate with its two child lists and is the
//! unit of extraction, validation and ingestion.
//!
//! A certificate's identity is derived from its content (tax id, certificate
//! number) plus its creation timestamp, so re-submissions of the same
//! document at different times get distinct identities on purpose.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod taxid;
pub mod text;
pub mod validate;

pub use validate::{ValidationError, Validator};

/// Origin tag recorded for certificates entered by hand rather than
/// extracted from an uploaded document.
pub const ORIGIN_MANUAL: &str = "manual-entry";

/// Number of hex characters kept from the identity digest.
const IDENTITY_LEN: usize = 12;

// ============================================================================
// Parent record
// ============================================================================

/// A sanitation-treatment certificate.
///
/// `certificate_number` is the human-facing number printed on the document;
/// it is *not* unique across re-submissions. `source_file` is the stable name
/// of the input that produced this record (uploaded filename or
/// [`ORIGIN_MANUAL`]) and is the store's deduplication key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: Option<String>,
    pub certificate_number: String,
    pub license_number: String,
    pub company_name: String,
    pub trade_name: String,
    pub tax_id: String,
    pub address: String,
    pub issue_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub treated_pests: String,
    pub source_file: String,
    pub created_at: DateTime<Utc>,
    pub amount: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
}

impl Certificate {
    /// Derive the content-based identity: the first 12 hex characters of a
    /// SHA-256 digest over tax id, certificate number and creation timestamp.
    pub fn generate_id(&self) -> String {
        let input = format!(
            "{}|{}|{}",
            self.tax_id,
            self.certificate_number,
            rfc3339_micros(&self.created_at)
        );
        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        let digest = hasher.finalize();
        let mut out = String::with_capacity(IDENTITY_LEN);
        for b in digest[..IDENTITY_LEN / 2].iter() {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        out
    }

    /// Assign an identity if none has been generated yet.
    pub fn ensure_id(&mut self) -> &str {
        if self.id.is_none() {
            self.id = Some(self.generate_id());
        }
        self.id.as_deref().expect("id assigned above")
    }
}

/// Canonical timestamp serialization used for identity derivation and the
/// persisted `created_at` column: RFC 3339 with microsecond precision.
pub fn rfc3339_micros(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, false)
}

// ============================================================================
// Child records
// ============================================================================

/// A chemical product applied during the treatment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChemicalProduct {
    pub name: String,
    pub chemical_class: String,
    pub concentration: Option<f64>,
}

/// An application method used during the treatment. Quantity is free text
/// ("200 ml", "3 estações") and is never interpreted numerically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationMethod {
    pub description: String,
    pub quantity: String,
}

// ============================================================================
// Bundle
// ============================================================================

/// One certificate plus its two child lists; the unit of ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub certificate: Certificate,
    pub products: Vec<ChemicalProduct>,
    pub methods: Vec<ApplicationMethod>,
}

impl Bundle {
    pub fn new(
        certificate: Certificate,
        products: Vec<ChemicalProduct>,
        methods: Vec<ApplicationMethod>,
    ) -> Self {
        Self {
            certificate,
            products,
            methods,
        }
    }
}
