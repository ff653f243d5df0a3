//! Brazilian company tax identifier (CNPJ) handling.
//!
//! A CNPJ is a 12-digit base followed by two weighted mod-11 check digits.
//! Inputs may arrive punctuated (`11.222.333/0001-81`), bare
//! (`11222333000181`), or embedded in a longer cell value; [`extract`] finds
//! and verifies one and returns it in the canonical punctuated form.

use regex::Regex;

const CNPJ_DIGITS: usize = 14;

/// Locate a tax id inside `value`, verify its check digits and return the
/// canonical punctuated form. `None` when no verifiable id is present.
pub fn extract(value: &str) -> Option<String> {
    let pattern = Regex::new(r"(\d{2})\.?\d{3}\.\d{3}/\d{4}-\d{2}").unwrap();

    if let Some(found) = pattern.find(value) {
        let digits: String = found
            .as_str()
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        if is_valid(&digits) {
            return format(&digits);
        }
        return None;
    }

    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == CNPJ_DIGITS && is_valid(&digits) {
        return format(&digits);
    }
    None
}

/// Verify the two check digits of a bare 14-digit tax id.
///
/// An id whose 14 digits are all identical passes the arithmetic but is a
/// known-invalid placeholder, so it is rejected up front.
pub fn is_valid(digits: &str) -> bool {
    if digits.len() != CNPJ_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let first = digits.as_bytes()[0];
    if digits.bytes().all(|b| b == first) {
        return false;
    }

    let value = |i: usize| (digits.as_bytes()[i] - b'0') as u32;

    const WEIGHTS_1: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
    let sum: u32 = (0..12).map(|i| value(i) * WEIGHTS_1[i]).sum();
    let mut digit_1 = 11 - (sum % 11);
    if digit_1 >= 10 {
        digit_1 = 0;
    }
    if value(12) != digit_1 {
        return false;
    }

    const WEIGHTS_2: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
    let sum: u32 = (0..13).map(|i| value(i) * WEIGHTS_2[i]).sum();
    let mut digit_2 = 11 - (sum % 11);
    if digit_2 >= 10 {
        digit_2 = 0;
    }
    value(13) == digit_2
}

/// Render 14 digits in the canonical `XX.XXX.XXX/XXXX-XX` form. Punctuation
/// already present in the input is ignored. `None` when the digit count is
/// wrong.
pub fn format(value: &str) -> Option<String> {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != CNPJ_DIGITS {
        return None;
    }
    Some(format!(
        "{}.{}.{}/{}-{}",
        &digits[..2],
        &digits[2..5],
        &digits[5..8],
        &digits[8..12],
        &digits[12..]
    ))
}
