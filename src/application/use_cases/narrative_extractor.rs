//! Pulls structured fields out of the completion service's free-text reply.
//!
//! The reply is expected to hold an optional `[CODE: XXXX]` marker and four
//! labeled lines (`[التشخيص]: ...` and so on). Nothing is required: every
//! missing piece falls back to a fixed value, so a reply in any shape still
//! produces a usable result.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::narrative::{
    NarrativeResult, CAUSE_LABEL, DIAGNOSIS_LABEL, FALLBACK_CAUSE, FALLBACK_DIAGNOSIS,
    FALLBACK_PART, FALLBACK_TIP, PART_LABEL, TIP_LABEL,
};
use crate::infrastructure::response::clean_llm_response;

static CODE_MARKER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[CODE:\s*(\w+)\]").unwrap());

// First `P` plus four digits anywhere in the user's text, so `codeP0171`
// and `P01715` both yield `P0171`.
static QUERY_CODE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(P[0-9]{4})").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Diagnosis,
    Cause,
    Part,
    Tip,
}

const LABELS: [(&str, Field); 4] = [
    (DIAGNOSIS_LABEL, Field::Diagnosis),
    (CAUSE_LABEL, Field::Cause),
    (PART_LABEL, Field::Part),
    (TIP_LABEL, Field::Tip),
];

#[derive(Default)]
struct NarrativeBuilder {
    diagnosis: Option<String>,
    cause: Option<String>,
    part: Option<String>,
    tip: Option<String>,
}

impl NarrativeBuilder {
    fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Diagnosis => &mut self.diagnosis,
            Field::Cause => &mut self.cause,
            Field::Part => &mut self.part,
            Field::Tip => &mut self.tip,
        }
    }

    /// First occurrence of a label wins; empty values count as absent.
    fn set(&mut self, field: Field, value: &str) {
        let slot = self.slot(field);
        if slot.is_none() && !value.is_empty() {
            *slot = Some(value.to_string());
        }
    }

    fn build(self, extracted_code: Option<String>) -> NarrativeResult {
        NarrativeResult {
            diagnosis: self.diagnosis.unwrap_or_else(|| FALLBACK_DIAGNOSIS.to_string()),
            cause: self.cause.unwrap_or_else(|| FALLBACK_CAUSE.to_string()),
            part: self.part.unwrap_or_else(|| FALLBACK_PART.to_string()),
            tip: self.tip.unwrap_or_else(|| FALLBACK_TIP.to_string()),
            extracted_code,
        }
    }
}

/// Drops one leading markdown emphasis marker.
fn strip_marker(text: &str) -> &str {
    text.strip_prefix("**")
        .or_else(|| text.strip_prefix("__"))
        .unwrap_or(text)
}

/// Splits a line into its label and trimmed value, if it starts with one of
/// the known labels followed by a colon. Emphasis wrapped around the label
/// (`**[التشخيص]:**`) is ignored; the value is left as written.
fn labeled_line(line: &str) -> Option<(Field, &str)> {
    let line = strip_marker(line.trim_start()).trim_start();
    LABELS.iter().find_map(|(label, field)| {
        let rest = strip_marker(line.strip_prefix(label)?).trim_start();
        let value = rest.strip_prefix(':')?;
        Some((*field, strip_marker(value).trim()))
    })
}

/// Code from the in-band marker, else a code-shaped token in the user's text.
pub fn detect_fault_code(reply: &str, original_query: &str) -> Option<String> {
    CODE_MARKER_PATTERN
        .captures(reply)
        .or_else(|| QUERY_CODE_PATTERN.captures(original_query))
        .and_then(|captures| captures.get(1))
        .map(|code| code.as_str().to_string())
}

pub fn extract(raw_reply: &str, original_query: &str) -> NarrativeResult {
    let reply = clean_llm_response(raw_reply);

    let mut builder = NarrativeBuilder::default();
    for (field, value) in reply.lines().filter_map(labeled_line) {
        builder.set(field, value);
    }

    builder.build(detect_fault_code(&reply, original_query))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_full_reply() {
        let reply = "[CODE: P0300]\n[التشخيص]:   X  \n[السبب المحتمل]: بوجيه تالف\n[القطعة المطلوبة]: طقم بوجيهات\n[نصيحة المهندس]: غير البوجيهات كلها";
        let result = extract(reply, "");

        assert_eq!(result.extracted_code.as_deref(), Some("P0300"));
        assert_eq!(result.diagnosis, "X");
        assert_eq!(result.cause, "بوجيه تالف");
        assert_eq!(result.part, "طقم بوجيهات");
        assert_eq!(result.tip, "غير البوجيهات كلها");
    }

    #[test]
    fn test_unstructured_reply_uses_fallbacks() {
        let result = extract("I am not sure what is wrong with the car.", "صوت خبط");
        assert_eq!(result, NarrativeResult::default());
        assert!(result.extracted_code.is_none());
    }

    #[test]
    fn test_empty_reply_uses_fallbacks() {
        assert_eq!(extract("", ""), NarrativeResult::default());
    }

    #[test]
    fn test_missing_fields_fall_back_individually() {
        let result = extract("[التشخيص]: تسريب هواء\n[نصيحة المهندس]:   ", "");
        assert_eq!(result.diagnosis, "تسريب هواء");
        assert_eq!(result.cause, FALLBACK_CAUSE);
        assert_eq!(result.part, FALLBACK_PART);
        assert_eq!(result.tip, FALLBACK_TIP);
    }

    #[test]
    fn test_label_must_start_the_line() {
        let result = extract("كما قلت [التشخيص]: مش هنا", "");
        assert_eq!(result.diagnosis, FALLBACK_DIAGNOSIS);

        let result = extract("   [التشخيص] : هنا", "");
        assert_eq!(result.diagnosis, "هنا");
    }

    #[test]
    fn test_first_label_occurrence_wins() {
        let result = extract("[التشخيص]: أول\n[التشخيص]: تاني", "");
        assert_eq!(result.diagnosis, "أول");
    }

    #[test]
    fn test_code_marker_beats_query_code() {
        let result = extract("[CODE:P0171]", "الكود P0300");
        assert_eq!(result.extracted_code.as_deref(), Some("P0171"));
    }

    #[test]
    fn test_code_falls_back_to_query() {
        assert_eq!(
            detect_fault_code("no marker", "العربية طالعة p0420 من امبارح"),
            Some("p0420".to_string())
        );
        assert_eq!(detect_fault_code("", "P0171"), Some("P0171".to_string()));
    }

    #[test]
    fn test_query_code_takes_first_four_digits_anywhere() {
        assert_eq!(detect_fault_code("", "P01715"), Some("P0171".to_string()));
        assert_eq!(detect_fault_code("", "codeP0171"), Some("P0171".to_string()));
        assert_eq!(detect_fault_code("", "XP0171"), Some("P0171".to_string()));
        assert_eq!(detect_fault_code("", "(P0171)"), Some("P0171".to_string()));
        assert_eq!(detect_fault_code("", "P017"), None);
    }

    #[test]
    fn test_markdown_wrapped_labels_are_found() {
        let result = extract("**[CODE: P0171]**\n**[التشخيص]:** تسريب هواء", "");
        assert_eq!(result.extracted_code.as_deref(), Some("P0171"));
        assert_eq!(result.diagnosis, "تسريب هواء");

        let result = extract("__[السبب المحتمل]__: خرطوم مقطوع", "");
        assert_eq!(result.cause, "خرطوم مقطوع");
    }

    #[test]
    fn test_emphasis_inside_values_is_kept() {
        let result = extract(
            "[التشخيص]: تسريب **هواء**\n**[نصيحة المهندس]:** افحص __الخراطيم__ **فوراً**",
            "",
        );
        assert_eq!(result.diagnosis, "تسريب **هواء**");
        assert_eq!(result.tip, "افحص __الخراطيم__ **فوراً**");
    }
}
