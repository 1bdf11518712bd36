//! Phone Number Normalization
//!
//! Every comparison between phone numbers in this crate goes through
//! `normalize_digits`: all non-digit characters are stripped first, then a
//! leading country code is dropped so that `+1 (555) 123-4567` and
//! `5551234567` compare equal.

/// Digits kept from the end of a number when comparing.
/// Covers national numbers for NANP (+1) and India (+91).
pub const NATIONAL_NUMBER_DIGITS: usize = 10;

/// Strip every non-digit character.
pub fn digits_only(number: &str) -> String {
    number.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Comparison form of a phone number: digits only, trimmed to the trailing
/// national-number digits when a country code prefix is present.
pub fn normalize_digits(number: &str) -> String {
    let digits = digits_only(number);
    if digits.len() > NATIONAL_NUMBER_DIGITS {
        digits[digits.len() - NATIONAL_NUMBER_DIGITS..].to_string()
    } else {
        digits
    }
}

/// True when both numbers normalize to the same non-empty digit string.
pub fn numbers_match(a: &str, b: &str) -> bool {
    let a = normalize_digits(a);
    !a.is_empty() && a == normalize_digits(b)
}

/// Build the `tel:` target handed to the outbound dialer.
pub fn tel_target(number: &str) -> String {
    format!("tel:{}", digits_only(number))
}
