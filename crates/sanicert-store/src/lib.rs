//! Append-only flat-file storage for certificate bundles.
//!
//! Three linked CSV files under one data directory:
//!
//! - `certificates.csv` — one row per certificate (the parent record),
//! - `chemical_products.csv` — child rows keyed `<certificate-id>-P<nnn>`,
//! - `application_methods.csv` — child rows keyed `<certificate-id>-M<nnn>`.
//!
//! The store is append-only: records are written once and thereafter only
//! read. Re-ingesting the same origin (`source_file`) is idempotent — the
//! existing certificate is returned and nothing is written. All writes go
//! through a single per-instance critical section, so concurrent upserts
//! never interleave across the three files. Crash-atomicity across the files
//! is explicitly *not* provided; a crash mid-upsert can leave orphan child
//! rows.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use thiserror::Error;

use sanicert_model::{
    rfc3339_micros, ApplicationMethod, Bundle, Certificate, ChemicalProduct,
};

pub mod csv;

pub const CSV_CERTIFICATES: &str = "certificates.csv";
pub const CSV_PRODUCTS: &str = "chemical_products.csv";
pub const CSV_METHODS: &str = "application_methods.csv";

pub const CERTIFICATE_HEADERS: [&str; 15] = [
    "id",
    "certificate_number",
    "license_number",
    "company_name",
    "trade_name",
    "tax_id",
    "address",
    "issue_date",
    "expiry_date",
    "treated_pests",
    "source_file",
    "created_at",
    "amount",
    "district",
    "city",
];

pub const PRODUCT_HEADERS: [&str; 6] = [
    "id",
    "certificate_id",
    "certificate_number",
    "name",
    "chemical_class",
    "concentration",
];

pub const METHOD_HEADERS: [&str; 5] = [
    "id",
    "certificate_id",
    "certificate_number",
    "description",
    "quantity",
];

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed row in {file}: {reason}")]
    Malformed { file: String, reason: String },

    /// Two certificates with different content hashed to the same identity.
    /// Appending the second would make child rows ambiguous, so the upsert
    /// fails instead.
    #[error("identity collision: a different certificate already uses id {0}")]
    IdentityCollision(String),
}

impl StoreError {
    fn malformed(file: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            file: file.to_string(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Store contract
// ============================================================================

/// Contract the ingestion pipeline writes against. Backends with stronger
/// durability guarantees can implement this without the pipeline changing.
pub trait RecordStore: Send + Sync {
    /// Insert-if-absent-by-origin. With `dedupe`, an existing certificate
    /// with the same `source_file` is returned unchanged and nothing is
    /// written. Safe to call from multiple threads.
    fn upsert(&self, bundle: &Bundle, dedupe: bool) -> Result<Certificate, StoreError>;

    /// First certificate whose origin matches, with its children.
    fn find_by_source(&self, source_file: &str) -> Result<Option<Bundle>, StoreError>;

    /// First certificate whose number matches, with its children. Numbers
    /// may legitimately repeat across origins; first match wins.
    fn find_by_number(&self, number: &str) -> Result<Option<Bundle>, StoreError>;

    /// All certificates in insertion order.
    fn list(&self) -> Result<Vec<Certificate>, StoreError>;
}

// ============================================================================
// CSV-backed store
// ============================================================================

pub struct CsvStore {
    data_dir: PathBuf,
    certificates_path: PathBuf,
    products_path: PathBuf,
    methods_path: PathBuf,
    // Serializes every multi-file write (and the dedup scan that precedes
    // it). Owned by the instance so separate stores never contend.
    write_lock: Mutex<()>,
}

impl CsvStore {
    /// Open (and if needed create) the store under `data_dir`. Ensures the
    /// three backing files exist with their header rows; safe to call
    /// repeatedly.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let store = Self {
            certificates_path: data_dir.join(CSV_CERTIFICATES),
            products_path: data_dir.join(CSV_PRODUCTS),
            methods_path: data_dir.join(CSV_METHODS),
            data_dir,
            write_lock: Mutex::new(()),
        };

        Self::ensure_file(&store.certificates_path, &CERTIFICATE_HEADERS)?;
        Self::ensure_file(&store.products_path, &PRODUCT_HEADERS)?;
        Self::ensure_file(&store.methods_path, &METHOD_HEADERS)?;

        tracing::debug!(data_dir = %store.data_dir.display(), "record store ready");
        Ok(store)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn ensure_file(path: &Path, headers: &[&str]) -> Result<(), StoreError> {
        if !path.exists() {
            let mut file = std::fs::File::create(path)?;
            file.write_all(csv::encode_record(headers).as_bytes())?;
            file.write_all(b"\n")?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Row mapping
    // ------------------------------------------------------------------

    fn certificate_row(certificate: &Certificate, id: &str) -> String {
        let issue = certificate.issue_date.to_string();
        let expiry = certificate.expiry_date.to_string();
        let created = rfc3339_micros(&certificate.created_at);
        csv::encode_record(&[
            id,
            &certificate.certificate_number,
            &certificate.license_number,
            &certificate.company_name,
            &certificate.trade_name,
            &certificate.tax_id,
            &certificate.address,
            &issue,
            &expiry,
            &certificate.treated_pests,
            &certificate.source_file,
            &created,
            certificate.amount.as_deref().unwrap_or(""),
            certificate.district.as_deref().unwrap_or(""),
            certificate.city.as_deref().unwrap_or(""),
        ])
    }

    fn row_to_certificate(row: &[String]) -> Result<Certificate, StoreError> {
        if row.len() != CERTIFICATE_HEADERS.len() {
            return Err(StoreError::malformed(
                CSV_CERTIFICATES,
                format!("expected {} fields, got {}", CERTIFICATE_HEADERS.len(), row.len()),
            ));
        }

        let issue_date: NaiveDate = row[7]
            .parse()
            .map_err(|_| StoreError::malformed(CSV_CERTIFICATES, format!("bad issue date {:?}", row[7])))?;
        let expiry_date: NaiveDate = row[8]
            .parse()
            .map_err(|_| StoreError::malformed(CSV_CERTIFICATES, format!("bad expiry date {:?}", row[8])))?;
        let created_at = DateTime::parse_from_rfc3339(&row[11])
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|_| {
                StoreError::malformed(CSV_CERTIFICATES, format!("bad creation timestamp {:?}", row[11]))
            })?;

        let optional = |value: &String| {
            if value.is_empty() {
                None
            } else {
                Some(value.clone())
            }
        };

        Ok(Certificate {
            id: Some(row[0].clone()),
            certificate_number: row[1].clone(),
            license_number: row[2].clone(),
            company_name: row[3].clone(),
            trade_name: row[4].clone(),
            tax_id: row[5].clone(),
            address: row[6].clone(),
            issue_date,
            expiry_date,
            treated_pests: row[9].clone(),
            source_file: row[10].clone(),
            created_at,
            amount: optional(&row[12]),
            district: optional(&row[13]),
            city: optional(&row[14]),
        })
    }

    fn row_to_product(row: &[String]) -> Result<ChemicalProduct, StoreError> {
        if row.len() != PRODUCT_HEADERS.len() {
            return Err(StoreError::malformed(
                CSV_PRODUCTS,
                format!("expected {} fields, got {}", PRODUCT_HEADERS.len(), row.len()),
            ));
        }
        let concentration = if row[5].is_empty() {
            None
        } else {
            Some(row[5].parse::<f64>().map_err(|_| {
                StoreError::malformed(CSV_PRODUCTS, format!("bad concentration {:?}", row[5]))
            })?)
        };
        Ok(ChemicalProduct {
            name: row[3].clone(),
            chemical_class: row[4].clone(),
            concentration,
        })
    }

    fn row_to_method(row: &[String]) -> Result<ApplicationMethod, StoreError> {
        if row.len() != METHOD_HEADERS.len() {
            return Err(StoreError::malformed(
                CSV_METHODS,
                format!("expected {} fields, got {}", METHOD_HEADERS.len(), row.len()),
            ));
        }
        Ok(ApplicationMethod {
            description: row[3].clone(),
            quantity: row[4].clone(),
        })
    }

    // ------------------------------------------------------------------
    // Unlocked readers (callers hold the lock)
    // ------------------------------------------------------------------

    fn read_rows(&self, path: &Path, file: &str) -> Result<Vec<Vec<String>>, StoreError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(path)?;
        let mut rows = csv::parse_records(&content);
        if rows.is_empty() {
            return Err(StoreError::malformed(file, "missing header row"));
        }
        rows.remove(0); // header
        Ok(rows)
    }

    fn load_certificates(&self) -> Result<Vec<Certificate>, StoreError> {
        self.read_rows(&self.certificates_path, CSV_CERTIFICATES)?
            .iter()
            .map(|row| Self::row_to_certificate(row))
            .collect()
    }

    fn load_products(&self, certificate_id: &str) -> Result<Vec<ChemicalProduct>, StoreError> {
        self.read_rows(&self.products_path, CSV_PRODUCTS)?
            .iter()
            .filter(|row| row.get(1).is_some_and(|id| id == certificate_id))
            .map(|row| Self::row_to_product(row))
            .collect()
    }

    fn load_methods(&self, certificate_id: &str) -> Result<Vec<ApplicationMethod>, StoreError> {
        self.read_rows(&self.methods_path, CSV_METHODS)?
            .iter()
            .filter(|row| row.get(1).is_some_and(|id| id == certificate_id))
            .map(|row| Self::row_to_method(row))
            .collect()
    }

    fn load_bundle(&self, certificate: Certificate) -> Result<Bundle, StoreError> {
        let id = certificate.id.clone().unwrap_or_default();
        let products = self.load_products(&id)?;
        let methods = self.load_methods(&id)?;
        Ok(Bundle::new(certificate, products, methods))
    }

    fn append_line(path: &Path, line: &str) -> Result<(), StoreError> {
        let mut file = OpenOptions::new().append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }
}

impl RecordStore for CsvStore {
    fn upsert(&self, bundle: &Bundle, dedupe: bool) -> Result<Certificate, StoreError> {
        let _guard = self.write_lock.lock();

        let existing = self.load_certificates()?;

        if dedupe {
            if let Some(found) = existing
                .iter()
                .find(|c| c.source_file == bundle.certificate.source_file)
            {
                tracing::debug!(
                    source_file = %bundle.certificate.source_file,
                    "origin already stored, returning existing certificate"
                );
                return Ok(found.clone());
            }
        }

        let mut certificate = bundle.certificate.clone();
        let id = certificate.ensure_id().to_string();

        if existing.iter().any(|c| c.id.as_deref() == Some(&id)) {
            return Err(StoreError::IdentityCollision(id));
        }

        Self::append_line(
            &self.certificates_path,
            &Self::certificate_row(&certificate, &id),
        )?;

        for (index, product) in bundle.products.iter().enumerate() {
            let row_id = format!("{id}-P{:03}", index + 1);
            let concentration = product
                .concentration
                .map(|c| c.to_string())
                .unwrap_or_default();
            let line = csv::encode_record(&[
                &row_id,
                &id,
                &certificate.certificate_number,
                &product.name,
                &product.chemical_class,
                &concentration,
            ]);
            Self::append_line(&self.products_path, &line)?;
        }

        for (index, method) in bundle.methods.iter().enumerate() {
            let row_id = format!("{id}-M{:03}", index + 1);
            let line = csv::encode_record(&[
                &row_id,
                &id,
                &certificate.certificate_number,
                &method.description,
                &method.quantity,
            ]);
            Self::append_line(&self.methods_path, &line)?;
        }

        Ok(certificate)
    }

    fn find_by_source(&self, source_file: &str) -> Result<Option<Bundle>, StoreError> {
        let _guard = self.write_lock.lock();
        let found = self
            .load_certificates()?
            .into_iter()
            .find(|c| c.source_file == source_file);
        match found {
            Some(certificate) => Ok(Some(self.load_bundle(certificate)?)),
            None => Ok(None),
        }
    }

    fn find_by_number(&self, number: &str) -> Result<Option<Bundle>, StoreError> {
        let _guard = self.write_lock.lock();
        let found = self
            .load_certificates()?
            .into_iter()
            .find(|c| c.certificate_number == number);
        match found {
            Some(certificate) => Ok(Some(self.load_bundle(certificate)?)),
            None => Ok(None),
        }
    }

    fn list(&self) -> Result<Vec<Certificate>, StoreError> {
        let _guard = self.write_lock.lock();
        self.load_certificates()
    }
}

#[cfg(test)]
mod tests;
