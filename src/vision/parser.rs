//! Structured-output parsing for nameplate extraction
//!
//! Backends are asked for one JSON object with a fixed schema, but what comes
//! back varies: code fences, prose around the object, numbers where strings
//! were asked for, unknown issue labels. Parsing is lenient field by field,
//! and a reply with no usable JSON degrades to raw text at confidence 0
//! instead of failing the attempt.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::core::utils::extract_json_object;
use crate::models::{ElectricalSpecs, ImageIssue};

/// Prompt sent with every nameplate image
pub const EXTRACTION_PROMPT: &str = r#"You are reading the nameplate of a piece of industrial or commercial equipment (motor, drive, pump, compressor, HVAC unit, breaker, PLC...).

Return ONLY a single JSON object, no prose, with exactly these keys:
{
  "manufacturer": "brand as printed, or null",
  "model_number": "model / catalog number as printed, or null",
  "serial_number": "serial number, or null",
  "fault_code": "fault or alarm code shown on a display, or null",
  "equipment_type": "e.g. motor, vfd, pump, compressor, contactor, or null",
  "equipment_subtype": "e.g. induction, servo, centrifugal, or null",
  "condition": "good | worn | damaged | unknown",
  "visible_issues": "free text describing visible damage, or null",
  "voltage": "rated voltage with unit, e.g. 480V, or null",
  "current": "rated current with unit, e.g. 12.5A, or null",
  "horsepower": "e.g. 10HP, or null",
  "phase": "1 or 3, or null",
  "frequency": "e.g. 60Hz, or null",
  "additional_specs": {"rpm": "...", "kw": "...", "enclosure": "...", "ip_rating": "..."},
  "raw_text": "every piece of text you can read on the plate, verbatim",
  "confidence": 0.0,
  "image_issues": []
}

"confidence" is your own 0.0-1.0 estimate that the identification fields are correct.
"image_issues" lists any of: "rotated", "upside_down", "partial", "dirty", "blurry", "glare".
Use null for anything you cannot read. Do not guess model or serial numbers."#;

/// Fields read from one backend reply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedExtraction {
    pub manufacturer: Option<String>,
    pub model_number: Option<String>,
    pub serial_number: Option<String>,
    pub fault_code: Option<String>,
    pub equipment_type: Option<String>,
    pub equipment_subtype: Option<String>,
    pub condition: Option<String>,
    pub visible_issues: Option<String>,
    pub specs: ElectricalSpecs,
    pub raw_text: String,
    /// Backend's own confidence, clamped to [0, 1]
    pub self_confidence: f64,
    pub image_issues: Vec<ImageIssue>,
    /// No JSON could be read; `raw_text` holds the whole reply
    pub degraded: bool,
}

/// Parse a backend reply; never fails
pub fn parse_extraction(reply: &str) -> ParsedExtraction {
    let object = extract_json_object(reply)
        .and_then(|json| serde_json::from_str::<Value>(json).ok())
        .and_then(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        });

    let Some(object) = object else {
        tracing::debug!("Unparsable extraction reply, keeping it as raw text");
        return ParsedExtraction {
            raw_text: reply.trim().to_string(),
            degraded: true,
            ..Default::default()
        };
    };

    let field = |key: &str| lookup(&object, key).and_then(text_of);

    ParsedExtraction {
        manufacturer: field("manufacturer"),
        model_number: field("model_number"),
        serial_number: field("serial_number"),
        fault_code: field("fault_code"),
        equipment_type: field("equipment_type"),
        equipment_subtype: field("equipment_subtype"),
        condition: field("condition"),
        visible_issues: lookup(&object, "visible_issues").and_then(joined_text),
        specs: ElectricalSpecs {
            voltage: field("voltage"),
            current: field("current"),
            horsepower: field("horsepower"),
            phase: field("phase"),
            frequency: field("frequency"),
            additional: lookup(&object, "additional_specs")
                .map(additional_specs)
                .unwrap_or_default(),
        },
        raw_text: field("raw_text").unwrap_or_default(),
        self_confidence: lookup(&object, "confidence")
            .and_then(number_of)
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(0.0),
        image_issues: lookup(&object, "image_issues")
            .map(image_issues)
            .unwrap_or_default(),
        degraded: false,
    }
}

/// Top-level key, or the same key inside a nested `specs` object
fn lookup<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|v| !v.is_null()).or_else(|| {
        ["specs", "electrical_specs"]
            .iter()
            .filter_map(|nested| object.get(*nested)?.as_object())
            .find_map(|nested| nested.get(key).filter(|v| !v.is_null()))
    })
}

/// Strings and numbers as trimmed text; blanks and "null"-ish strings count as absent
fn text_of(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    match text.to_lowercase().as_str() {
        "" | "null" | "none" | "n/a" | "unknown" => None,
        _ => Some(text),
    }
}

fn joined_text(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(text_of).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        other => text_of(other),
    }
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn additional_specs(value: &Value) -> BTreeMap<String, String> {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(key, v)| text_of(v).map(|text| (key.clone(), text)))
                .collect()
        })
        .unwrap_or_default()
}

fn image_issues(value: &Value) -> Vec<ImageIssue> {
    let labels: Vec<&str> = match value {
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        Value::String(s) => s.split(',').collect(),
        _ => Vec::new(),
    };
    let mut issues: Vec<ImageIssue> = labels
        .into_iter()
        .filter_map(ImageIssue::from_label)
        .collect();
    issues.sort();
    issues.dedup();
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_reply() {
        let reply = r#"```json
{
  "manufacturer": "Siemens",
  "model_number": "6SL3210-1KE21-3UF1",
  "serial_number": null,
  "voltage": "380-480V",
  "phase": 3,
  "frequency": "50/60Hz",
  "additional_specs": {"kw": 5.5, "ip_rating": "IP20", "notes": ""},
  "raw_text": "SIEMENS SINAMICS G120C 6SL3210-1KE21-3UF1",
  "confidence": 0.9,
  "image_issues": ["glare", "haunted", "Glare"]
}
```"#;
        let parsed = parse_extraction(reply);
        assert!(!parsed.degraded);
        assert_eq!(parsed.manufacturer.as_deref(), Some("Siemens"));
        assert_eq!(parsed.serial_number, None);
        assert_eq!(parsed.specs.phase.as_deref(), Some("3"));
        assert_eq!(parsed.specs.additional.get("kw").map(String::as_str), Some("5.5"));
        assert!(!parsed.specs.additional.contains_key("notes"));
        assert_eq!(parsed.self_confidence, 0.9);
        assert_eq!(parsed.image_issues, vec![ImageIssue::Glare]);
    }

    #[test]
    fn test_prose_around_object() {
        let reply = "Sure! Here is the data:\n{\"manufacturer\": \"ABB\", \"confidence\": \"0.75\"}\nLet me know.";
        let parsed = parse_extraction(reply);
        assert_eq!(parsed.manufacturer.as_deref(), Some("ABB"));
        assert_eq!(parsed.self_confidence, 0.75);
    }

    #[test]
    fn test_unparsable_reply_degrades_to_raw_text() {
        let reply = "  The plate reads ALLEN-BRADLEY 22B-D010N104 but I cannot format it.  ";
        let parsed = parse_extraction(reply);
        assert!(parsed.degraded);
        assert_eq!(parsed.self_confidence, 0.0);
        assert_eq!(parsed.raw_text, reply.trim());
        assert!(parsed.manufacturer.is_none());
    }

    #[test]
    fn test_blank_and_placeholder_values_are_absent() {
        let parsed = parse_extraction(
            r#"{"manufacturer": "  ", "model_number": "N/A", "fault_code": "unknown", "confidence": 7}"#,
        );
        assert!(parsed.manufacturer.is_none());
        assert!(parsed.model_number.is_none());
        assert!(parsed.fault_code.is_none());
        assert_eq!(parsed.self_confidence, 1.0);
    }

    #[test]
    fn test_nested_specs_and_issue_string() {
        let parsed = parse_extraction(
            r#"{"specs": {"voltage": "230V", "current": 4.2}, "visible_issues": ["rust", "cracked housing"], "image_issues": "rotated, blurry"}"#,
        );
        assert_eq!(parsed.specs.voltage.as_deref(), Some("230V"));
        assert_eq!(parsed.specs.current.as_deref(), Some("4.2"));
        assert_eq!(parsed.visible_issues.as_deref(), Some("rust, cracked housing"));
        assert_eq!(
            parsed.image_issues,
            vec![ImageIssue::Rotated, ImageIssue::Blurry]
        );
    }

    #[test]
    fn test_prompt_names_every_key() {
        for key in [
            "manufacturer",
            "model_number",
            "serial_number",
            "fault_code",
            "equipment_type",
            "equipment_subtype",
            "condition",
            "visible_issues",
            "voltage",
            "current",
            "horsepower",
            "phase",
            "frequency",
            "additional_specs",
            "raw_text",
            "confidence",
            "image_issues",
        ] {
            assert!(EXTRACTION_PROMPT.contains(&format!("\"{}\"", key)), "{key}");
        }
    }
}
