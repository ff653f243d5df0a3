//! Extraction boundary: turning input documents into bundles.
//!
//! The engine only speaks [`Extractor`]; the provided [`JsonExtractor`]
//! reads JSON documents shaped like:
//!
//! ```json
//! {
//!   "certificate": {
//!     "number": "CERT-2024-001",
//!     "license": "LIC-SP-12345",
//!     "company_name": "Empresa Teste LTDA",
//!     "trade_name": "Teste Corp",
//!     "tax_id": "11.222.333/0001-81",
//!     "address": "Rua Teste, 123, Centro, São Paulo",
//!     "issue_date": "15 de janeiro de 2024",
//!     "expiry_date": "2024-07-15",
//!     "treated_pests": "Baratas, Formigas"
//!   },
//!   "products": [{"name": "Inseticida Alpha", "class": "Piretroide", "concentration": 2.5}],
//!   "methods": [{"description": "Pulverização", "quantity": "200 ml"}]
//! }
//! ```
//!
//! Date fields accept ISO (`2024-01-15`), day-first numeric (`15/01/2024`)
//! and Portuguese long form (`15 de janeiro de 2024`), since source
//! documents mix all three.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use serde_json::Value;
use thiserror::Error;

use sanicert_model::text::normalize_whitespace;
use sanicert_model::{ApplicationMethod, Bundle, Certificate, ChemicalProduct};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("required field missing: {0}")]
    MissingField(String),

    #[error("unrecognized date value: {0:?}")]
    InvalidDate(String),
}

/// Converts one input document into a bundle.
pub trait Extractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Bundle, ExtractError>;
}

/// Extractor for JSON certificate documents. The origin recorded on the
/// resulting bundle is the input's file name.
#[derive(Debug, Default)]
pub struct JsonExtractor;

impl Extractor for JsonExtractor {
    fn extract(&self, path: &Path) -> Result<Bundle, ExtractError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ExtractError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let payload: Value = serde_json::from_str(&raw).map_err(|source| ExtractError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        let origin = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        bundle_from_payload(&payload, &origin)
    }
}

// ============================================================================
// Payload conversion (shared with manual entry)
// ============================================================================

/// Build a bundle from a JSON payload. Used by both the file extractor and
/// the manual-entry path; `default_origin` is recorded unless the payload
/// carries an explicit `source_file`.
pub fn bundle_from_payload(payload: &Value, default_origin: &str) -> Result<Bundle, ExtractError> {
    let certificate_payload = payload
        .get("certificate")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            ExtractError::InvalidPayload("'certificate' structure missing or invalid".to_string())
        })?;

    let products_payload = match payload.get("products") {
        None | Some(Value::Null) => &[][..],
        Some(Value::Array(items)) => items.as_slice(),
        Some(_) => {
            return Err(ExtractError::InvalidPayload(
                "'products' must be a list".to_string(),
            ))
        }
    };
    let methods_payload = match payload.get("methods") {
        None | Some(Value::Null) => &[][..],
        Some(Value::Array(items)) => items.as_slice(),
        Some(_) => {
            return Err(ExtractError::InvalidPayload(
                "'methods' must be a list".to_string(),
            ))
        }
    };

    let field = |keys: &[&str]| -> Option<String> {
        keys.iter()
            .find_map(|key| certificate_payload.get(*key))
            .and_then(value_as_text)
            .map(|text| normalize_whitespace(&text))
            .filter(|text| !text.is_empty())
    };

    let certificate_number = field(&["number", "certificate_number"])
        .ok_or_else(|| ExtractError::MissingField("certificate number".to_string()))?;
    let license_number = field(&["license", "license_number"])
        .ok_or_else(|| ExtractError::MissingField("license number".to_string()))?;

    let issue_date = parse_date(
        &field(&["issue_date"])
            .ok_or_else(|| ExtractError::MissingField("issue date".to_string()))?,
    )?;
    let expiry_date = parse_date(
        &field(&["expiry_date"])
            .ok_or_else(|| ExtractError::MissingField("expiry date".to_string()))?,
    )?;

    let address = field(&["address"]).unwrap_or_default();
    let mut district = field(&["district"]);
    let mut city = field(&["city"]);

    // Brazilian addresses conventionally end "..., district, city"; infer
    // the two when the payload leaves them out.
    if (district.is_none() || city.is_none()) && !address.is_empty() {
        let parts: Vec<&str> = address.split(',').map(str::trim).collect();
        if parts.len() >= 3 {
            if district.is_none() {
                district = Some(parts[parts.len() - 2].to_string());
            }
            if city.is_none() {
                city = Some(parts[parts.len() - 1].to_string());
            }
        }
    }

    let origin = field(&["source_file"]).unwrap_or_else(|| default_origin.to_string());

    let certificate = Certificate {
        id: None,
        certificate_number,
        license_number,
        company_name: field(&["company_name"]).unwrap_or_default(),
        trade_name: field(&["trade_name"]).unwrap_or_default(),
        tax_id: field(&["tax_id"]).unwrap_or_default(),
        address,
        issue_date,
        expiry_date,
        treated_pests: field(&["treated_pests", "pests"]).unwrap_or_default(),
        source_file: origin,
        created_at: Utc::now(),
        amount: field(&["amount"]),
        district,
        city,
    };

    let mut products = Vec::with_capacity(products_payload.len());
    for item in products_payload {
        let object = item.as_object().ok_or_else(|| {
            ExtractError::InvalidPayload("invalid product item".to_string())
        })?;
        let text = |keys: &[&str]| -> String {
            keys.iter()
                .find_map(|key| object.get(*key))
                .and_then(value_as_text)
                .map(|t| normalize_whitespace(&t))
                .unwrap_or_default()
        };
        products.push(ChemicalProduct {
            name: text(&["name", "product_name"]),
            chemical_class: text(&["class", "chemical_class"]),
            concentration: object
                .get("concentration")
                .and_then(value_as_concentration),
        });
    }

    let mut methods = Vec::with_capacity(methods_payload.len());
    for item in methods_payload {
        let object = item
            .as_object()
            .ok_or_else(|| ExtractError::InvalidPayload("invalid method item".to_string()))?;
        let text = |keys: &[&str]| -> String {
            keys.iter()
                .find_map(|key| object.get(*key))
                .and_then(value_as_text)
                .map(|t| normalize_whitespace(&t))
                .unwrap_or_default()
        };
        methods.push(ApplicationMethod {
            description: text(&["description", "method"]),
            quantity: text(&["quantity"]),
        });
    }

    Ok(Bundle::new(certificate, products, methods))
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Concentrations arrive as numbers (`2.5`) or strings, sometimes with a
/// decimal comma (`"2,5"`). Unparseable values degrade to absent rather than
/// failing the whole document.
fn value_as_concentration(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.trim().is_empty() => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

// ============================================================================
// Date parsing
// ============================================================================

const PT_BR_MONTHS: [(&str, u32); 12] = [
    ("JANEIRO", 1),
    ("FEVEREIRO", 2),
    ("MARÇO", 3),
    ("ABRIL", 4),
    ("MAIO", 5),
    ("JUNHO", 6),
    ("JULHO", 7),
    ("AGOSTO", 8),
    ("SETEMBRO", 9),
    ("OUTUBRO", 10),
    ("NOVEMBRO", 11),
    ("DEZEMBRO", 12),
];

/// Parse a date in any of the accepted source forms.
pub fn parse_date(value: &str) -> Result<NaiveDate, ExtractError> {
    let normalized = normalize_whitespace(value);
    if normalized.is_empty() {
        return Err(ExtractError::MissingField("date".to_string()));
    }

    if let Ok(date) = normalized.parse::<NaiveDate>() {
        return Ok(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(&normalized, "%d/%m/%Y") {
        return Ok(date);
    }

    parse_pt_br_date(&normalized).ok_or_else(|| ExtractError::InvalidDate(value.to_string()))
}

/// `"15 de janeiro de 2024"` (connective `de` optional, case-insensitive).
fn parse_pt_br_date(value: &str) -> Option<NaiveDate> {
    let upper = value.to_uppercase();
    let tokens: Vec<&str> = upper
        .split_whitespace()
        .filter(|token| *token != "DE")
        .collect();
    if tokens.len() != 3 {
        return None;
    }

    let day: u32 = tokens[0].parse().ok()?;
    let month = PT_BR_MONTHS
        .iter()
        .find(|(name, _)| *name == tokens[1])
        .map(|(_, number)| *number)?;
    let year: i32 = tokens[2].parse().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_iso_and_day_first_dates() {
        assert_eq!(
            parse_date("2024-01-15").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
        assert_eq!(
            parse_date("15/01/2024").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
    }

    #[test]
    fn parses_portuguese_long_form() {
        assert_eq!(
            parse_date("15 de janeiro de 2024").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
        assert_eq!(
            parse_date("  1 DE MARÇO DE 2023 ").unwrap(),
            NaiveDate::from_ymd_opt(2023, 3, 1).unwrap()
        );
    }

    #[test]
    fn rejects_unrecognized_dates() {
        assert!(matches!(
            parse_date("sometime soon"),
            Err(ExtractError::InvalidDate(_))
        ));
    }

    fn full_payload() -> Value {
        json!({
            "certificate": {
                "number": "CERT-2024-001",
                "license": "LIC-SP-12345",
                "company_name": "Empresa  Teste LTDA",
                "trade_name": "Teste Corp",
                "tax_id": "11.222.333/0001-81",
                "address": "Rua Teste, 123, Centro, São Paulo",
                "issue_date": "2024-01-15",
                "expiry_date": "2024-07-15",
                "treated_pests": "Baratas, Formigas"
            },
            "products": [
                {"name": "Inseticida Alpha", "class": "Piretroide", "concentration": "2,5"}
            ],
            "methods": [
                {"description": "Pulverização", "quantity": "200 ml"}
            ]
        })
    }

    #[test]
    fn builds_bundle_from_payload() {
        let bundle = bundle_from_payload(&full_payload(), "upload-001.json").unwrap();
        assert_eq!(bundle.certificate.certificate_number, "CERT-2024-001");
        assert_eq!(bundle.certificate.company_name, "Empresa Teste LTDA");
        assert_eq!(bundle.certificate.source_file, "upload-001.json");
        assert_eq!(bundle.products.len(), 1);
        assert_eq!(bundle.products[0].concentration, Some(2.5));
        assert_eq!(bundle.methods[0].quantity, "200 ml");
    }

    #[test]
    fn infers_district_and_city_from_address_tail() {
        let bundle = bundle_from_payload(&full_payload(), "x.json").unwrap();
        assert_eq!(bundle.certificate.district.as_deref(), Some("Centro"));
        assert_eq!(bundle.certificate.city.as_deref(), Some("São Paulo"));
    }

    #[test]
    fn explicit_district_wins_over_inference() {
        let mut payload = full_payload();
        payload["certificate"]["district"] = json!("Jardins");
        let bundle = bundle_from_payload(&payload, "x.json").unwrap();
        assert_eq!(bundle.certificate.district.as_deref(), Some("Jardins"));
        assert_eq!(bundle.certificate.city.as_deref(), Some("São Paulo"));
    }

    #[test]
    fn missing_certificate_object_is_invalid_payload() {
        let err = bundle_from_payload(&json!({"products": []}), "x.json").unwrap_err();
        assert!(matches!(err, ExtractError::InvalidPayload(_)));
    }

    #[test]
    fn number_and_license_are_required() {
        let mut payload = full_payload();
        payload["certificate"]
            .as_object_mut()
            .unwrap()
            .remove("number");
        let err = bundle_from_payload(&payload, "x.json").unwrap_err();
        assert!(matches!(err, ExtractError::MissingField(_)));
    }

    #[test]
    fn products_must_be_a_list() {
        let mut payload = full_payload();
        payload["products"] = json!("not a list");
        let err = bundle_from_payload(&payload, "x.json").unwrap_err();
        assert!(matches!(err, ExtractError::InvalidPayload(_)));
    }
}
