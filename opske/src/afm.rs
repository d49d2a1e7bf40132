//! Greek tax identifier (ΑΦΜ) check-digit validation

use once_cell::sync::Lazy;
use regex::Regex;

/// Weights applied to the first eight digits.
pub const AFM_WEIGHTS: [u32; 8] = [256, 128, 64, 32, 16, 8, 4, 2];

static PARTY_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+) - (\d{9})$").expect("party label pattern"));

/// Returns true when `afm` is exactly nine ASCII digits and the last one is the
/// weighted check digit of the first eight.
pub fn validate_afm(afm: &str) -> bool {
    if afm.len() != 9 || !afm.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let digits: Vec<u32> = afm.bytes().map(|b| u32::from(b - b'0')).collect();
    digits[8] == check_digit(&digits[..8])
}

/// Check digit for the first eight digits of an identifier.
pub fn check_digit(first_eight: &[u32]) -> u32 {
    let total: u32 = first_eight
        .iter()
        .zip(AFM_WEIGHTS.iter())
        .map(|(d, w)| d * w)
        .sum();
    match total % 11 {
        10 => 0,
        remainder => remainder,
    }
}

/// Splits `"<Company Name> - <9 digits>"` into its name and identifier.
pub fn split_party_label(label: &str) -> Option<(&str, &str)> {
    let caps = PARTY_LABEL.captures(label)?;
    let name = caps.get(1)?.as_str();
    let afm = caps.get(2)?.as_str();
    Some((name, afm))
}
