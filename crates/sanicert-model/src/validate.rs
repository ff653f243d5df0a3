//! Business-rule validation for certificate bundles.
//!
//! Checks are independent and violations accumulate: a bundle with a missing
//! company name, an inverted date range and a bad tax id reports all three.
//! On success the validator also normalizes the bundle in place (whitespace
//! collapse on the free-text fields, tax id rewritten to its canonical
//! punctuated form).

use thiserror::Error;

use crate::text::normalize_whitespace;
use crate::{taxid, ApplicationMethod, Bundle, Certificate, ChemicalProduct};

/// One or more business-rule violations, reported together.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}", .violations.join("; "))]
pub struct ValidationError {
    pub violations: Vec<String>,
}

impl ValidationError {
    pub fn new(violations: Vec<String>) -> Self {
        Self { violations }
    }
}

pub struct Validator;

impl Validator {
    /// Validate and normalize a whole bundle. All violations from the
    /// certificate and both child lists are collected before reporting.
    pub fn validate_bundle(bundle: &mut Bundle) -> Result<(), ValidationError> {
        let mut violations = Vec::new();
        Self::check_certificate(&mut bundle.certificate, &mut violations);
        Self::check_products(&bundle.products, &mut violations);
        Self::check_methods(&bundle.methods, &mut violations);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(violations))
        }
    }

    /// Validate and normalize the parent record alone.
    pub fn validate_certificate(certificate: &mut Certificate) -> Result<(), ValidationError> {
        let mut violations = Vec::new();
        Self::check_certificate(certificate, &mut violations);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(violations))
        }
    }

    fn check_certificate(certificate: &mut Certificate, violations: &mut Vec<String>) {
        let required = [
            ("certificate_number", &certificate.certificate_number),
            ("license_number", &certificate.license_number),
            ("company_name", &certificate.company_name),
            ("trade_name", &certificate.trade_name),
            ("tax_id", &certificate.tax_id),
            ("address", &certificate.address),
            ("treated_pests", &certificate.treated_pests),
        ];
        for (name, value) in required {
            if value.is_empty() {
                violations.push(format!("Required field missing: {name}"));
            }
        }

        if certificate.expiry_date < certificate.issue_date {
            violations.push("Expiry date is before issue date".to_string());
        }

        match taxid::extract(&certificate.tax_id) {
            Some(canonical) => certificate.tax_id = canonical,
            None => violations.push("Invalid or missing tax id".to_string()),
        }

        certificate.company_name = normalize_whitespace(&certificate.company_name);
        certificate.trade_name = normalize_whitespace(&certificate.trade_name);
        certificate.address = normalize_whitespace(&certificate.address);
        certificate.treated_pests = normalize_whitespace(&certificate.treated_pests);
    }

    fn check_products(products: &[ChemicalProduct], violations: &mut Vec<String>) {
        for (index, product) in products.iter().enumerate() {
            if product.name.is_empty() {
                violations.push(format!("Product {}: missing product name", index + 1));
            }
            if product.chemical_class.is_empty() {
                violations.push(format!("Product {}: missing chemical class", index + 1));
            }
        }
    }

    fn check_methods(methods: &[ApplicationMethod], violations: &mut Vec<String>) {
        for (index, method) in methods.iter().enumerate() {
            if method.description.is_empty() {
                violations.push(format!("Method {}: missing method description", index + 1));
            }
            if method.quantity.is_empty() {
                violations.push(format!("Method {}: missing quantity", index + 1));
            }
        }
    }
}
