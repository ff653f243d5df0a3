//! Small text helpers shared by extraction, validation and artifact naming.

use crate::Certificate;

/// Collapse runs of whitespace (spaces, tabs, newlines) into single spaces
/// and trim the ends.
pub fn normalize_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Make a certificate number or similar value safe for use in filenames.
pub fn sanitize_for_filename(value: &str) -> String {
    let mut sanitized = normalize_whitespace(value);
    for ch in ['/', '\\', ' ', ':'] {
        sanitized = sanitized.replace(ch, "-");
    }
    sanitized
}

/// Build a unique artifact filename for a certificate:
/// `trade-name_cnpj8_number_YYYYMMDD-HHMMSS-id4.ext`.
///
/// Certificate numbers repeat across re-submissions; the timestamp plus the
/// identity prefix keeps artifacts from overwriting each other.
pub fn unique_artifact_filename(certificate: &Certificate, extension: &str) -> String {
    let trade_name = {
        let name = sanitize_for_filename(&certificate.trade_name);
        let name = if name.is_empty() {
            "sem-nome".to_string()
        } else {
            name
        };
        name.chars().take(30).collect::<String>()
    };

    let tax_digits: String = certificate
        .tax_id
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    let tax_short = if tax_digits.is_empty() {
        "00000000".to_string()
    } else {
        tax_digits.chars().take(8).collect()
    };

    let number = sanitize_for_filename(&certificate.certificate_number);
    let timestamp = certificate.created_at.format("%Y%m%d-%H%M%S");

    let id_prefix: String = certificate
        .id
        .as_deref()
        .unwrap_or("")
        .chars()
        .take(4)
        .collect();
    let suffix = if id_prefix.is_empty() {
        String::new()
    } else {
        format!("-{id_prefix}")
    };

    let extension = if extension.is_empty() || extension.starts_with('.') {
        extension.to_string()
    } else {
        format!(".{extension}")
    };

    format!("{trade_name}_{tax_short}_{number}_{timestamp}{suffix}{extension}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    #[test]
    fn normalize_collapses_inner_whitespace() {
        assert_eq!(normalize_whitespace("a   b\t c\nd"), "a b c d");
        assert_eq!(normalize_whitespace("  trimmed  "), "trimmed");
    }

    #[test]
    fn sanitize_replaces_separator_characters() {
        assert_eq!(sanitize_for_filename("CERT/2024 01:B"), "CERT-2024-01-B");
    }

    #[test]
    fn artifact_filename_combines_all_parts() {
        let certificate = Certificate {
            id: Some("abc123def456".to_string()),
            certificate_number: "CERT/2024-001".to_string(),
            license_number: "LIC-1".to_string(),
            company_name: "Empresa Teste LTDA".to_string(),
            trade_name: "Teste Corp".to_string(),
            tax_id: "11.222.333/0001-81".to_string(),
            address: "Rua A, 1, Centro, Campinas".to_string(),
            issue_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            expiry_date: NaiveDate::from_ymd_opt(2024, 7, 15).unwrap(),
            treated_pests: "Baratas".to_string(),
            source_file: "upload.json".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
            amount: None,
            district: None,
            city: None,
        };

        let name = unique_artifact_filename(&certificate, "html");
        assert_eq!(
            name,
            "Teste-Corp_11222333_CERT-2024-001_20240115-103000-abc1.html"
        );
    }
}
