//! Structural checks applied to regex candidates.
//!
//! Each validator takes the raw matched substring and decides whether it is
//! plausibly real. They are usable on their own, independent of any regex.

use serde::{Deserialize, Serialize};

/// Longest allowed local part of an email address.
const EMAIL_LOCAL_MAX: usize = 64;

/// Longest allowed domain of an email address.
const EMAIL_DOMAIN_MAX: usize = 255;

fn digits_of(candidate: &str) -> Vec<u32> {
    candidate.chars().filter_map(|c| c.to_digit(10)).collect()
}

/// Luhn mod-10 checksum over the digits of `candidate`.
///
/// Non-digit characters are ignored. An input without digits fails.
#[must_use]
pub fn luhn_check(candidate: &str) -> bool {
    let digits = digits_of(candidate);
    if digits.is_empty() {
        return false;
    }

    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();

    sum % 10 == 0
}

/// Validate a payment card number: 13 to 19 digits passing Luhn.
#[must_use]
pub fn is_valid_credit_card(candidate: &str) -> bool {
    let len = candidate.chars().filter(char::is_ascii_digit).count();
    (13..=19).contains(&len) && luhn_check(candidate)
}

/// Validate a US Social Security Number.
///
/// Rejects area numbers 000, 666 and 900-999, group 00 and serial 0000.
#[must_use]
pub fn is_valid_ssn(candidate: &str) -> bool {
    let digits: String = candidate.chars().filter(char::is_ascii_digit).collect();
    if digits.len() != 9 || digits == "000000000" {
        return false;
    }

    let (area, rest) = digits.split_at(3);
    let (group, serial) = rest.split_at(2);

    if area == "000" || area == "666" || area.starts_with('9') {
        return false;
    }
    group != "00" && serial != "0000"
}

/// Validate the shape of an email address.
#[must_use]
pub fn is_valid_email(candidate: &str) -> bool {
    let mut parts = candidate.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };

    if local.is_empty() || domain.is_empty() {
        return false;
    }
    if local.len() > EMAIL_LOCAL_MAX || domain.len() > EMAIL_DOMAIN_MAX {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return false;
    }
    labels.last().is_some_and(|tld| tld.chars().count() >= 2)
}

/// Digit-count rule for phone numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PhoneRule {
    /// Exactly ten digits with an area code not starting with 0 or 1.
    #[default]
    NorthAmerican,
    /// Any digit count in `min..=max`.
    Range {
        /// Fewest digits accepted.
        min: usize,
        /// Most digits accepted.
        max: usize,
    },
}

impl PhoneRule {
    /// Seven to fifteen digits, which covers most international formats.
    #[must_use]
    pub const fn international() -> Self {
        Self::Range { min: 7, max: 15 }
    }

    /// Validate a phone number under this rule.
    #[must_use]
    pub fn validate(&self, candidate: &str) -> bool {
        let digits = digits_of(candidate);
        let Some(&first) = digits.first() else {
            return false;
        };

        if digits.iter().all(|&d| d == first) {
            return false;
        }

        match *self {
            Self::NorthAmerican => digits.len() == 10 && first > 1,
            Self::Range { min, max } => (min..=max).contains(&digits.len()),
        }
    }
}

/// Validate a phone number using the North American rule.
#[must_use]
pub fn is_valid_phone(candidate: &str) -> bool {
    PhoneRule::NorthAmerican.validate(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luhn_known_good_numbers() {
        assert!(luhn_check("4532015112830366"));
        assert!(luhn_check("4111111111111111"));
        assert!(luhn_check("5500000000000004"));
        assert!(luhn_check("340000000000009"));
        assert!(luhn_check("4532-0151-1283-0366"));
    }

    #[test]
    fn test_luhn_single_digit_mutation_fails() {
        let card = "4532015112830366";
        for i in 0..card.len() {
            let mut bytes = card.as_bytes().to_vec();
            bytes[i] = if bytes[i] == b'9' { b'0' } else { bytes[i] + 1 };
            let mutated = String::from_utf8(bytes).unwrap();
            assert!(!luhn_check(&mutated), "mutation at {i} still passed: {mutated}");
        }
    }

    #[test]
    fn test_luhn_no_digits() {
        assert!(!luhn_check(""));
        assert!(!luhn_check("abc"));
    }

    #[test]
    fn test_credit_card_length_bounds() {
        // Valid Luhn but only 12 digits
        assert!(!is_valid_credit_card("000000000000"));
        assert!(is_valid_credit_card("4222222222222"));
        assert!(is_valid_credit_card("4532015112830366"));
        assert!(!is_valid_credit_card("4532015112830367"));
        // 20 digits
        assert!(!is_valid_credit_card("00000000000000000000"));
    }

    #[test]
    fn test_ssn_valid() {
        assert!(is_valid_ssn("123-45-6789"));
        assert!(is_valid_ssn("123456789"));
        assert!(is_valid_ssn("899.99.9999"));
    }

    #[test]
    fn test_ssn_rejects_bad_area() {
        assert!(!is_valid_ssn("000-12-3456"));
        assert!(!is_valid_ssn("666-12-3456"));
        for area in 900..=999 {
            let candidate = format!("{area}-12-3456");
            assert!(!is_valid_ssn(&candidate), "{candidate}");
        }
    }

    #[test]
    fn test_ssn_rejects_zero_group_and_serial() {
        assert!(!is_valid_ssn("123-00-4567"));
        assert!(!is_valid_ssn("123-45-0000"));
        assert!(!is_valid_ssn("000000000"));
    }

    #[test]
    fn test_ssn_rejects_wrong_length() {
        assert!(!is_valid_ssn("12-345-678"));
        assert!(!is_valid_ssn("1234567890"));
    }

    #[test]
    fn test_email_valid() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("first.last@mail.example.org"));
    }

    #[test]
    fn test_email_invalid() {
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@b.co"));
        assert!(!is_valid_email("a@"));
        assert!(!is_valid_email("a@b.c"));
        assert!(!is_valid_email("a@@b.co"));
        assert!(!is_valid_email("a@b..co"));
        assert!(!is_valid_email("no-at-sign.com"));
    }

    #[test]
    fn test_email_length_limits() {
        let long_local = format!("{}@example.com", "a".repeat(65));
        assert!(!is_valid_email(&long_local));
        let ok_local = format!("{}@example.com", "a".repeat(64));
        assert!(is_valid_email(&ok_local));
        let long_domain = format!("a@{}.com", "b".repeat(252));
        assert!(!is_valid_email(&long_domain));
    }

    #[test]
    fn test_phone_north_american() {
        assert!(is_valid_phone("555-123-4567"));
        assert!(is_valid_phone("(212) 555 0100"));
        assert!(!is_valid_phone("155-123-4567"));
        assert!(!is_valid_phone("055-123-4567"));
        assert!(!is_valid_phone("555-1234"));
        assert!(!is_valid_phone("2222222222"));
    }

    #[test]
    fn test_phone_range_rule() {
        let rule = PhoneRule::international();
        assert!(rule.validate("555-1234"));
        assert!(rule.validate("+44 20 7946 0958"));
        assert!(!rule.validate("123456"));
        assert!(!rule.validate("1234567890123456"));
        assert!(!rule.validate("7777777"));
    }

    #[test]
    fn test_phone_rule_default() {
        assert_eq!(PhoneRule::default(), PhoneRule::NorthAmerican);
    }

    #[test]
    fn test_phone_rule_serde() {
        let json = serde_json::to_string(&PhoneRule::international()).unwrap();
        assert_eq!(json, r#"{"kind":"range","min":7,"max":15}"#);
        let parsed: PhoneRule = serde_json::from_str(r#"{"kind":"north_american"}"#).unwrap();
        assert_eq!(parsed, PhoneRule::NorthAmerican);
    }
}
