//! The prompt sent to the VLM alongside every prescription image.
//!
//! Keeping the prompt here, and nowhere else, means the extraction contract
//! (which sections, which marker for illegible fields, which output format)
//! can be inspected and tested without a live model.
//!
//! Operators may replace it at startup via
//! [`crate::config::ServiceConfig::system_prompt`]; it is never customised
//! per request.

/// Literal marker the model must emit for a field it cannot read.
pub const UNREADABLE_MARKER: &str = "Not clearly readable";

/// Default instruction for transcribing a handwritten prescription.
///
/// Plain text only: the answer is embedded verbatim in the report page, where
/// Markdown or bullet symbols would show up as noise.
pub const PRESCRIPTION_PROMPT: &str = r#"You are a medical assistant AI. Analyze the uploaded doctor's handwritten prescription image carefully and provide:

1. The list of medicines mentioned.
2. The dosage for each medicine.
3. The purpose of each medicine.
4. Handwriting is often hard to read: correct the spelling of medicine names to the closest real medicine when you are reasonably confident.
5. If a field cannot be determined, write exactly "Not clearly readable" for that field.
6. Respond in plain text only. Do NOT use Markdown, asterisks, bullets, numbering, code fences or any other symbols or markup.

Repeat the following block once per medicine, separated by a blank line:

Medicine Name:
Dosage:
Purpose:"#;

/// Resolve the prompt to use: the operator override, or the default.
pub fn effective_prompt(override_prompt: Option<&str>) -> &str {
    match override_prompt {
        Some(p) if !p.trim().is_empty() => p,
        _ => PRESCRIPTION_PROMPT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_every_section() {
        for section in ["Medicine Name:", "Dosage:", "Purpose:"] {
            assert!(PRESCRIPTION_PROMPT.contains(section), "missing {section}");
        }
    }

    #[test]
    fn prompt_carries_unreadable_marker() {
        assert!(PRESCRIPTION_PROMPT.contains(&format!("\"{UNREADABLE_MARKER}\"")));
    }

    #[test]
    fn prompt_forbids_markup() {
        assert!(PRESCRIPTION_PROMPT.contains("plain text only"));
        assert!(PRESCRIPTION_PROMPT.contains("Markdown"));
    }

    #[test]
    fn blank_override_falls_back_to_default() {
        assert_eq!(effective_prompt(None), PRESCRIPTION_PROMPT);
        assert_eq!(effective_prompt(Some("   ")), PRESCRIPTION_PROMPT);
        assert_eq!(effective_prompt(Some("custom")), "custom");
    }
}
