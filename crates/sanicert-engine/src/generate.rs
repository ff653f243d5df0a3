//! Derived-artifact generation: per-certificate documents and the shared
//! consolidated sheet.
//!
//! The consolidated sheet is one file appended to by every worker, so it
//! serializes its own writes behind its own lock. That critical section is
//! independent of the record store's and the two are never merged.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;

use sanicert_model::text::unique_artifact_filename;
use sanicert_model::Bundle;
use sanicert_store::{csv, CERTIFICATE_HEADERS};

/// Shown for empty optional values in rendered documents.
const PLACEHOLDER: &str = "--";

/// Renders one document per accepted certificate.
pub trait DocumentGenerator: Send + Sync {
    fn generate(&self, bundle: &Bundle) -> Result<PathBuf>;
}

/// Accumulates every accepted certificate into one shared tabular file.
pub trait SheetGenerator: Send + Sync {
    fn append(&self, bundle: &Bundle) -> Result<PathBuf>;
    fn consolidated_path(&self) -> &Path;
}

// ============================================================================
// HTML documents
// ============================================================================

/// Writes a self-contained HTML document per certificate. Filenames combine
/// trade name, tax id prefix, certificate number, timestamp and identity
/// prefix so re-submissions never overwrite each other.
pub struct HtmlDocumentGenerator {
    output_dir: PathBuf,
}

impl HtmlDocumentGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn render(bundle: &Bundle) -> String {
        let certificate = &bundle.certificate;
        let show = |value: &str| -> String {
            if value.is_empty() {
                PLACEHOLDER.to_string()
            } else {
                escape(value)
            }
        };
        let show_opt = |value: &Option<String>| show(value.as_deref().unwrap_or(""));

        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html lang=\"pt-BR\">\n<head>\n");
        html.push_str("<meta charset=\"utf-8\">\n");
        let _ = writeln!(
            html,
            "<title>Certificado {}</title>",
            show(&certificate.certificate_number)
        );
        html.push_str("</head>\n<body>\n");

        let _ = writeln!(html, "<h1>Certificado de Tratamento Sanitário</h1>");
        html.push_str("<table class=\"meta\">\n");
        let meta = [
            ("Nº Certificado", show(&certificate.certificate_number)),
            ("Nº Licença", show(&certificate.license_number)),
            (
                "Execução",
                certificate.issue_date.format("%d/%m/%Y").to_string(),
            ),
            (
                "Validade",
                certificate.expiry_date.format("%d/%m/%Y").to_string(),
            ),
            (
                "Processado",
                certificate
                    .created_at
                    .format("%d/%m/%Y %H:%M:%S")
                    .to_string(),
            ),
        ];
        for (label, value) in meta {
            let _ = writeln!(html, "<tr><th>{label}</th><td>{value}</td></tr>");
        }
        html.push_str("</table>\n");

        html.push_str("<h2>Cliente</h2>\n<table class=\"client\">\n");
        let client = [
            ("Razão Social", show(&certificate.company_name)),
            ("Nome Fantasia", show(&certificate.trade_name)),
            ("CNPJ", show(&certificate.tax_id)),
            ("Endereço", show(&certificate.address)),
            ("Bairro", show_opt(&certificate.district)),
            ("Cidade", show_opt(&certificate.city)),
        ];
        for (label, value) in client {
            let _ = writeln!(html, "<tr><th>{label}</th><td>{value}</td></tr>");
        }
        html.push_str("</table>\n");

        html.push_str("<h2>Produtos Aplicados</h2>\n<table class=\"products\">\n");
        html.push_str("<tr><th>Produto</th><th>Classe Química</th><th>Concentração</th></tr>\n");
        for product in &bundle.products {
            let concentration = product
                .concentration
                .map(|c| c.to_string())
                .unwrap_or_else(|| PLACEHOLDER.to_string());
            let _ = writeln!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                show(&product.name),
                show(&product.chemical_class),
                concentration
            );
        }
        html.push_str("</table>\n");

        html.push_str("<h2>Métodos de Aplicação</h2>\n<table class=\"methods\">\n");
        html.push_str("<tr><th>Método</th><th>Quantidade</th></tr>\n");
        for method in &bundle.methods {
            let _ = writeln!(
                html,
                "<tr><td>{}</td><td>{}</td></tr>",
                show(&method.description),
                show(&method.quantity)
            );
        }
        html.push_str("</table>\n");

        let _ = writeln!(
            html,
            "<p class=\"pests\">Pragas tratadas: {}</p>",
            show(&certificate.treated_pests)
        );
        if let Some(amount) = &certificate.amount {
            let _ = writeln!(html, "<p class=\"amount\">Valor: {}</p>", escape(amount));
        }
        html.push_str("</body>\n</html>\n");
        html
    }
}

impl DocumentGenerator for HtmlDocumentGenerator {
    fn generate(&self, bundle: &Bundle) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;
        let filename = unique_artifact_filename(&bundle.certificate, "html");
        let path = self.output_dir.join(filename);
        std::fs::write(&path, Self::render(bundle))
            .with_context(|| format!("failed to write document {}", path.display()))?;
        Ok(path)
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// Consolidated sheet
// ============================================================================

/// Appends one row per accepted certificate to a single consolidated CSV.
/// Many pipeline workers share this file, so appends are serialized behind
/// the generator's own mutex.
pub struct ConsolidatedSheetGenerator {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ConsolidatedSheetGenerator {
    pub const DEFAULT_FILENAME: &'static str = "certificates_consolidated.csv";

    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            path: output_dir.as_ref().join(Self::DEFAULT_FILENAME),
            lock: Mutex::new(()),
        }
    }
}

impl SheetGenerator for ConsolidatedSheetGenerator {
    fn append(&self, bundle: &Bundle) -> Result<PathBuf> {
        let _guard = self.lock.lock();

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let is_new = !self.path.exists();
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open sheet {}", self.path.display()))?;

        if is_new {
            file.write_all(csv::encode_record(&CERTIFICATE_HEADERS).as_bytes())?;
            file.write_all(b"\n")?;
        }

        let certificate = &bundle.certificate;
        let issue = certificate.issue_date.to_string();
        let expiry = certificate.expiry_date.to_string();
        let created = sanicert_model::rfc3339_micros(&certificate.created_at);
        let row = csv::encode_record(&[
            certificate.id.as_deref().unwrap_or(""),
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
        ]);
        file.write_all(row.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(self.path.clone())
    }

    fn consolidated_path(&self) -> &Path {
        &self.path
    }
}
