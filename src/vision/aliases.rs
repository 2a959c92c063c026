//! Manufacturer alias table and identifier canonicalization

use regex::Regex;
use std::collections::HashMap;

lazy_static::lazy_static! {
    /// Lower-cased name variant -> canonical manufacturer key
    static ref MANUFACTURER_ALIASES: HashMap<&'static str, &'static str> = {
        let table: &[(&str, &[&str])] = &[
            ("siemens", &["siemens", "siemens ag", "sinamics", "simatic"]),
            ("allen_bradley", &["allen bradley", "allen-bradley", "allenbradley", "ab", "rockwell", "rockwell automation"]),
            ("abb", &["abb", "asea brown boveri", "baldor", "baldor reliance", "baldor-reliance"]),
            ("schneider", &["schneider", "schneider electric", "square d", "square-d", "telemecanique", "altivar"]),
            ("eaton", &["eaton", "cutler hammer", "cutler-hammer"]),
            ("ge", &["ge", "general electric", "g.e."]),
            ("mitsubishi", &["mitsubishi", "mitsubishi electric"]),
            ("yaskawa", &["yaskawa", "yaskawa electric", "magnetek"]),
            ("danfoss", &["danfoss", "vlt", "vacon"]),
            ("weg", &["weg"]),
            ("lenze", &["lenze"]),
            ("sew_eurodrive", &["sew", "sew eurodrive", "sew-eurodrive"]),
            ("omron", &["omron"]),
            ("fanuc", &["fanuc"]),
            ("emerson", &["emerson", "control techniques", "us motors", "u.s. motors"]),
            ("nidec", &["nidec"]),
            ("hitachi", &["hitachi"]),
            ("toshiba", &["toshiba"]),
            ("fuji_electric", &["fuji", "fuji electric"]),
            ("delta", &["delta", "delta electronics"]),
            ("leeson", &["leeson"]),
            ("marathon", &["marathon", "marathon electric"]),
            ("regal_rexnord", &["regal", "regal beloit", "regal rexnord"]),
            ("grundfos", &["grundfos"]),
            ("honeywell", &["honeywell"]),
            ("carrier", &["carrier"]),
            ("trane", &["trane"]),
            ("lennox", &["lennox"]),
            ("york", &["york", "johnson controls"]),
        ];
        let mut aliases = HashMap::new();
        for (canonical, variants) in table {
            for variant in *variants {
                aliases.insert(*variant, *canonical);
            }
        }
        aliases
    };

    static ref MODEL_LABEL: Option<Regex> = Regex::new(
        r"(?i)^\s*(model\s*(no\.?|number|#)?|m\s*/\s*n|cat(alog)?\.?\s*(no\.?|number|#)|part\s*(no\.?|number|#)|p\s*/\s*n)\s*[:#.\-]?\s*"
    ).ok();
}

fn alias_key(name: &str) -> String {
    name.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical key for a manufacturer. Unknown names pass through lower-cased
/// with spaces replaced by underscores.
pub fn normalize_manufacturer(name: &str) -> String {
    let key = alias_key(name);
    match MANUFACTURER_ALIASES.get(key.as_str()) {
        Some(canonical) => canonical.to_string(),
        None => key.replace(' ', "_"),
    }
}

/// Whether a name resolves to an entry of the alias table
pub fn is_known_manufacturer(name: &str) -> bool {
    let key = alias_key(name);
    MANUFACTURER_ALIASES.contains_key(key.as_str())
        || MANUFACTURER_ALIASES.values().any(|canonical| *canonical == key)
}

/// Every known variant with its canonical key
pub fn aliases() -> impl Iterator<Item = (&'static str, &'static str)> {
    MANUFACTURER_ALIASES.iter().map(|(variant, canonical)| (*variant, *canonical))
}

/// Strip label prefixes (`MODEL:`, `M/N`, `CAT NO`), drop whitespace, upper-case
pub fn normalize_model_number(raw: &str) -> String {
    let stripped = match MODEL_LABEL.as_ref() {
        Some(label) => label.replace(raw, ""),
        None => raw.into(),
    };
    stripped
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_lookup_is_case_insensitive() {
        assert_eq!(normalize_manufacturer("SIEMENS"), "siemens");
        assert_eq!(normalize_manufacturer("Allen-Bradley"), "allen_bradley");
        assert_eq!(normalize_manufacturer("  square   D "), "schneider");
        assert_eq!(normalize_manufacturer("Cutler-Hammer"), "eaton");
    }

    #[test]
    fn test_unknown_manufacturer_passes_through() {
        assert_eq!(normalize_manufacturer("Acme Motor Works"), "acme_motor_works");
        assert!(!is_known_manufacturer("Acme Motor Works"));
        assert!(is_known_manufacturer("Rockwell Automation"));
        assert!(is_known_manufacturer("allen_bradley"));
        assert_eq!(normalize_model_number("CAT320-B"), "CAT320-B");
    }

    #[test]
    fn test_canonical_keys_are_stable() {
        for (_, canonical) in aliases() {
            assert_eq!(normalize_manufacturer(canonical), canonical);
        }
    }

    #[test]
    fn test_model_number_canonicalization() {
        assert_eq!(normalize_model_number("6SL3210-1KE21-3UF1"), "6SL3210-1KE21-3UF1");
        assert_eq!(normalize_model_number("Model: 22b-d010 n104"), "22B-D010N104");
        assert_eq!(normalize_model_number("M/N ACS580-01"), "ACS580-01");
        assert_eq!(normalize_model_number("CAT. NO. 100-C09D10"), "100-C09D10");
        assert_eq!(normalize_model_number("cat no: atv320u15n4b"), "ATV320U15N4B");
        assert_eq!(normalize_model_number("   "), "");
    }
}
