// placeholder.rs - Language token substitution for prompt templates.

pub const FROM_LANG_TOKEN: &str = "${fromlang}";
pub const TO_LANG_TOKEN: &str = "${tolang}";

pub const AUTO_DETECT_LABEL: &str = "Auto Detect";
pub const DEFAULT_TARGET_LANGUAGE: &str = "Simplified Chinese";

/// Label substituted for `${fromlang}`. Empty or `auto` means auto detection.
pub fn source_label(from: &str) -> &str {
    let trimmed = from.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
        AUTO_DETECT_LABEL
    } else {
        from
    }
}

/// Label substituted for `${tolang}`.
pub fn target_label(to: &str) -> &str {
    if to.trim().is_empty() {
        DEFAULT_TARGET_LANGUAGE
    } else {
        to
    }
}

/// Substitute both language tokens into `template`.
///
/// Returns `None` for a missing or empty template. The two replacements are
/// literal and independent, with no recursion and no escaping, so every
/// occurrence of a token in the template is replaced.
pub fn expand(template: Option<&str>, from: &str, to: &str) -> Option<String> {
    let template = template.filter(|t| !t.is_empty())?;
    Some(
        template
            .replace(FROM_LANG_TOKEN, source_label(from))
            .replace(TO_LANG_TOKEN, target_label(to)),
    )
}
