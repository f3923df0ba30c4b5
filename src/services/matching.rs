//! Duplicate-patient matching
//!
//! Pure functions over normalized keys. The patient service feeds them the
//! rows that share a phone key or a name key with the incoming record.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Serialize;

/// Digits only, trimmed to the last ten (drops country codes)
pub fn normalize_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    let start = digits.len().saturating_sub(10);
    digits[start..].iter().collect()
}

/// Lowercase, punctuation as spaces, single spaces between words
pub fn normalize_name(name: &str) -> String {
    let spaced: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Similarity of two name keys in `0.0..=1.0`
///
/// Token-set containment ("ravi kumar" inside "ravi kumar sharma") counts as
/// a full match. Otherwise the score is the mean of Jaro-Winkler and
/// normalized Levenshtein.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let ta: HashSet<&str> = a.split(' ').collect();
    let tb: HashSet<&str> = b.split(' ').collect();
    if ta.is_subset(&tb) || tb.is_subset(&ta) {
        return 1.0;
    }

    let jw = strsim::jaro_winkler(a, b);
    let lev = strsim::normalized_levenshtein(a, b);
    (jw + lev) / 2.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStrength {
    Possible,
    Probable,
    Exact,
}

/// The fields matching looks at
#[derive(Debug, Clone)]
pub struct MatchKeys<'a> {
    pub phone_key: &'a str,
    pub name_key: &'a str,
    pub date_of_birth: Option<NaiveDate>,
}

fn dob_agrees(a: Option<NaiveDate>, b: Option<NaiveDate>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

/// Classify an existing record against an incoming one
pub fn match_candidate(
    incoming: &MatchKeys<'_>,
    existing: &MatchKeys<'_>,
    probable_threshold: f64,
) -> Option<MatchStrength> {
    let same_phone = !incoming.phone_key.is_empty() && incoming.phone_key == existing.phone_key;
    let same_name = !incoming.name_key.is_empty() && incoming.name_key == existing.name_key;

    if same_phone {
        if same_name && dob_agrees(incoming.date_of_birth, existing.date_of_birth) {
            return Some(MatchStrength::Exact);
        }
        if name_similarity(incoming.name_key, existing.name_key) >= probable_threshold {
            return Some(MatchStrength::Probable);
        }
        return Some(MatchStrength::Possible);
    }

    let same_dob = matches!(
        (incoming.date_of_birth, existing.date_of_birth),
        (Some(a), Some(b)) if a == b
    );
    if same_name && same_dob {
        return Some(MatchStrength::Probable);
    }
    None
}

/// One possible duplicate, as shown to the front desk
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateCandidate {
    pub patient_id: i64,
    pub patient_number: String,
    pub full_name: String,
    pub phone: String,
    pub date_of_birth: Option<NaiveDate>,
    pub strength: MatchStrength,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys<'a>(phone: &'a str, name: &'a str, dob: Option<NaiveDate>) -> MatchKeys<'a> {
        MatchKeys {
            phone_key: phone,
            name_key: name,
            date_of_birth: dob,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn test_normalize_phone_drops_country_code() {
        assert_eq!(normalize_phone("+91 98765-43210"), "9876543210");
        assert_eq!(normalize_phone("(040) 2345 678"), "0402345678");
        assert_eq!(normalize_phone("12345"), "12345");
        assert_eq!(normalize_phone("n/a"), "");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Ravi   KUMAR "), "ravi kumar");
        assert_eq!(normalize_name("D'Souza, Maria-Ann"), "d souza maria ann");
        assert_eq!(normalize_name("..."), "");
    }

    #[test]
    fn test_name_similarity() {
        assert_eq!(name_similarity("ravi kumar", "ravi kumar"), 1.0);
        assert_eq!(name_similarity("ravi kumar", "ravi kumar sharma"), 1.0);
        assert!(name_similarity("ravi kumar", "ravi kumaar") > 0.8);
        assert!(name_similarity("ravi kumar", "sita devi") < 0.8);
        assert_eq!(name_similarity("", "ravi"), 0.0);
    }

    #[test]
    fn test_exact_match_tolerates_missing_dob() {
        let new = keys("9876543210", "ravi kumar", None);
        let old = keys("9876543210", "ravi kumar", date(1990, 1, 1));
        assert_eq!(match_candidate(&new, &old, 0.8), Some(MatchStrength::Exact));
    }

    #[test]
    fn test_same_phone_conflicting_dob_is_probable() {
        let new = keys("9876543210", "ravi kumar", date(1991, 1, 1));
        let old = keys("9876543210", "ravi kumar", date(1990, 1, 1));
        assert_eq!(
            match_candidate(&new, &old, 0.8),
            Some(MatchStrength::Probable)
        );
    }

    #[test]
    fn test_family_member_on_same_phone_is_possible() {
        let new = keys("9876543210", "sita devi", None);
        let old = keys("9876543210", "ravi kumar", None);
        assert_eq!(
            match_candidate(&new, &old, 0.8),
            Some(MatchStrength::Possible)
        );
    }

    #[test]
    fn test_same_name_and_dob_on_new_phone_is_probable() {
        let new = keys("9000000000", "ravi kumar", date(1990, 1, 1));
        let old = keys("9876543210", "ravi kumar", date(1990, 1, 1));
        assert_eq!(
            match_candidate(&new, &old, 0.8),
            Some(MatchStrength::Probable)
        );

        let no_dob = keys("9000000000", "ravi kumar", None);
        assert_eq!(match_candidate(&no_dob, &old, 0.8), None);
    }

    #[test]
    fn test_strength_ordering() {
        assert!(MatchStrength::Exact > MatchStrength::Probable);
        assert!(MatchStrength::Probable > MatchStrength::Possible);
    }
}
