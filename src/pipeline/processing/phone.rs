//! Phone canonicalization into hyphenated national format.
//!
//! 11 digits -> `AAA-BBBB-CCCC`, 10 digits starting `02` -> `AA-BBBB-CCCC`,
//! other 10 digits -> `AAA-BBB-CCCC`. Anything else passes through as
//! suspect digits. Normalizing a canonical value returns it unchanged.

use crate::constants::SENTINEL_PHONE;
use crate::domain::Phone;

#[derive(Debug, Default, Clone, Copy)]
pub struct PhoneNormalizer;

impl PhoneNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, raw: Option<&str>) -> Phone {
        normalize_phone(raw)
    }
}

pub fn normalize_phone(raw: Option<&str>) -> Phone {
    let Some(raw) = raw.map(str::trim) else {
        return Phone::Sentinel;
    };
    if raw.is_empty() || raw == SENTINEL_PHONE {
        return Phone::Sentinel;
    }

    // Numeric cells sometimes arrive as "1012345678.0".
    let raw = raw.strip_suffix(".0").unwrap_or(raw);
    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Phone::Sentinel;
    }

    // Leading national zero dropped by a numeric column.
    if digits.starts_with("10") && digits.len() >= 10 {
        digits.insert(0, '0');
    }

    match digits.len() {
        11 => Phone::Canonical(format!("{}-{}-{}", &digits[..3], &digits[3..7], &digits[7..])),
        10 if digits.starts_with("02") => {
            Phone::Canonical(format!("{}-{}-{}", &digits[..2], &digits[2..6], &digits[6..]))
        }
        10 => Phone::Canonical(format!("{}-{}-{}", &digits[..3], &digits[3..6], &digits[6..])),
        _ => Phone::Suspect(digits),
    }
}
