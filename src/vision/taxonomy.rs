//! Taxonomy backfill
//! Cheap, non-LLM extraction of manufacturer, fault code and model number from
//! recognized raw text. Only fills gaps; never overwrites what a backend returned.

use regex::Regex;
use std::cmp::Reverse;

use crate::models::VisionExtractionResult;
use crate::vision::aliases;

lazy_static::lazy_static! {
    /// "FAULT F0002", "Alarm: A07991", "ERR 15"
    static ref LABELED_FAULT: Option<Regex> = Regex::new(
        r"(?i)\b(?:fault|alarm|error|err|trip)(?:\s*code)?\s*[:#\-]?\s*([a-z]{0,3}\d{1,5}[a-z]?)\b"
    ).ok();

    /// Bare drive-style codes: F0002, A07991, E015
    static ref BARE_FAULT: Option<Regex> = Regex::new(r"\b([FAE]\d{3,5})\b").ok();

    /// "MODEL: X", "M/N X", "CAT. NO. X", "TYPE X"
    static ref LABELED_MODEL: Option<Regex> = Regex::new(
        r"(?i)\b(?:model|mod|m\s*/\s*n|cat(?:alog)?\.?\s*(?:no\.?|number|#)|type|part\s*(?:no\.?|#))\s*(?:no\.?|number|#)?\s*[:#.]?\s*([a-z0-9][a-z0-9\-./]{3,})"
    ).ok();

    /// Unlabeled dashed part numbers: 6SL3210-1KE21-3UF1, ACS580-01
    static ref DASHED_TOKEN: Option<Regex> = Regex::new(r"\b([A-Z0-9]{2,}(?:-[A-Z0-9]+)+)\b").ok();

    /// Ratings that look like part numbers: 380-480V, 50-60HZ
    static ref RATING: Option<Regex> = Regex::new(r"^\d+(?:[.\-/]\d+)*(?:V|VAC|VDC|A|HZ|HP|KW|W|RPM)$").ok();
}

/// Shortest alias considered when scanning free text; two-letter names are too ambiguous
const MIN_ALIAS_LEN: usize = 3;

/// Canonical manufacturer key found in raw text.
///
/// The longest matching variant wins; among equally long ones, the one that
/// appears first in the text, then the alphabetically first.
pub fn extract_manufacturer(raw_text: &str) -> Option<String> {
    best_alias_match(raw_text, aliases::aliases())
}

/// Selection independent of the order `candidates` arrive in
fn best_alias_match<'a>(
    raw_text: &str,
    candidates: impl Iterator<Item = (&'a str, &'a str)>,
) -> Option<String> {
    let haystack = format!(" {} ", normalize_for_scan(raw_text));
    candidates
        .filter(|(variant, _)| variant.len() >= MIN_ALIAS_LEN)
        .filter_map(|(variant, canonical)| {
            let position = haystack.find(&format!(" {} ", normalize_for_scan(variant)))?;
            Some((variant, position, canonical))
        })
        .max_by_key(|(variant, position, _)| (variant.len(), Reverse(*position), Reverse(*variant)))
        .map(|(_, _, canonical)| canonical.to_string())
}

/// Lower-case, punctuation to spaces, single-spaced
fn normalize_for_scan(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '.' { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn extract_fault_code(raw_text: &str) -> Option<String> {
    let labeled = LABELED_FAULT
        .as_ref()
        .and_then(|re| re.captures(raw_text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_uppercase());
    labeled.or_else(|| {
        BARE_FAULT
            .as_ref()
            .and_then(|re| re.captures(raw_text))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}

pub fn extract_model_number(raw_text: &str) -> Option<String> {
    let has_digit = |s: &str| s.chars().any(|c| c.is_ascii_digit());

    let labeled = LABELED_MODEL.as_ref().and_then(|re| {
        re.captures_iter(raw_text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim_end_matches(['.', '/']).to_uppercase())
            .find(|candidate| has_digit(candidate))
    });
    if labeled.is_some() {
        return labeled;
    }

    let upper = raw_text.to_uppercase();
    let is_rating = |s: &str| RATING.as_ref().is_some_and(|re| re.is_match(s));
    DASHED_TOKEN.as_ref().and_then(|re| {
        re.captures_iter(&upper)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .find(|candidate| {
                has_digit(candidate)
                    && candidate.chars().any(|c| c.is_ascii_alphabetic())
                    && !is_rating(candidate)
            })
    })
}

/// Fill manufacturer, fault code and model number from raw text where the
/// backend left them empty. Returns the names of the fields filled.
pub fn backfill(result: &mut VisionExtractionResult) -> Vec<&'static str> {
    let mut filled = Vec::new();
    if result.raw_text.trim().is_empty() {
        return filled;
    }

    if result.manufacturer.is_none() {
        result.manufacturer = extract_manufacturer(&result.raw_text);
        if result.manufacturer.is_some() {
            filled.push("manufacturer");
        }
    }
    if result.fault_code.is_none() {
        result.fault_code = extract_fault_code(&result.raw_text);
        if result.fault_code.is_some() {
            filled.push("fault_code");
        }
    }
    if result.model_number.is_none() {
        result.model_number = extract_model_number(&result.raw_text);
        if result.model_number.is_some() {
            filled.push("model_number");
        }
    }

    if !filled.is_empty() {
        tracing::debug!("Backfilled {:?} from raw text", filled);
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manufacturer_from_raw_text() {
        assert_eq!(
            extract_manufacturer("ALLEN-BRADLEY PowerFlex 40 CAT NO 22B-D010N104").as_deref(),
            Some("allen_bradley")
        );
        assert_eq!(
            extract_manufacturer("Made by Cutler-Hammer, Pittsburgh").as_deref(),
            Some("eaton")
        );
        assert_eq!(extract_manufacturer("AB 12345 GE"), None);
        assert_eq!(extract_manufacturer("generic motor 5HP"), None);
    }

    #[test]
    fn test_equal_length_aliases_resolve_by_position() {
        // "carrier" and "siemens" are both seven letters
        assert_eq!(
            extract_manufacturer("CARRIER UNIT WITH SIEMENS DRIVE").as_deref(),
            Some("carrier")
        );
        assert_eq!(
            extract_manufacturer("SIEMENS DRIVE IN CARRIER UNIT").as_deref(),
            Some("siemens")
        );
    }

    #[test]
    fn test_alias_choice_ignores_table_order() {
        let mut table: Vec<(&str, &str)> = aliases::aliases().collect();
        table.sort();
        let forward = best_alias_match("CARRIER UNIT WITH SIEMENS DRIVE", table.iter().copied());
        table.reverse();
        let backward = best_alias_match("CARRIER UNIT WITH SIEMENS DRIVE", table.iter().copied());
        assert_eq!(forward, backward);
        assert_eq!(forward.as_deref(), Some("carrier"));

        // two spellings matching at the same place: alphabetical
        let ties = [("allen-bradley", "hyphenated"), ("allen bradley", "spaced")];
        let text = "ALLEN-BRADLEY 22B";
        assert_eq!(best_alias_match(text, ties.iter().copied()).as_deref(), Some("spaced"));
        assert_eq!(best_alias_match(text, ties.iter().rev().copied()).as_deref(), Some("spaced"));
    }

    #[test]
    fn test_fault_codes() {
        assert_eq!(extract_fault_code("FAULT F0002 DC overvoltage").as_deref(), Some("F0002"));
        assert_eq!(extract_fault_code("Alarm: a07991").as_deref(), Some("A07991"));
        assert_eq!(extract_fault_code("display shows F30001").as_deref(), Some("F30001"));
        assert_eq!(extract_fault_code("480V 3PH 60HZ"), None);
    }

    #[test]
    fn test_model_numbers() {
        assert_eq!(
            extract_model_number("SIEMENS SINAMICS G120C MODEL: 6SL3210-1KE21-3UF1").as_deref(),
            Some("6SL3210-1KE21-3UF1")
        );
        assert_eq!(
            extract_model_number("cat. no. 22b-d010n104 ser A").as_deref(),
            Some("22B-D010N104")
        );
        assert_eq!(
            extract_model_number("ABB ACS580-01 380-480V").as_deref(),
            Some("ACS580-01")
        );
        assert_eq!(extract_model_number("380-480V 50-60HZ"), None);
    }

    #[test]
    fn test_backfill_never_overwrites() {
        let mut result = VisionExtractionResult::new("groq", "scout");
        result.manufacturer = Some("Siemens".to_string());
        result.raw_text = "ABB ACS580-01 FAULT 2310".to_string();

        let filled = backfill(&mut result);

        assert_eq!(result.manufacturer.as_deref(), Some("Siemens"));
        assert_eq!(result.model_number.as_deref(), Some("ACS580-01"));
        assert_eq!(result.fault_code.as_deref(), Some("2310"));
        assert_eq!(filled, vec!["fault_code", "model_number"]);
    }

    #[test]
    fn test_backfill_without_raw_text_is_noop() {
        let mut result = VisionExtractionResult::new("groq", "scout");
        assert!(backfill(&mut result).is_empty());
        assert!(result.model_number.is_none());
    }
}
