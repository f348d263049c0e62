//! Letter-sequence preparation and translation post-processing helpers.

/// Normalizes a raw fingerspelled sequence for the translation model.
///
/// Uppercases, drops everything outside `A`-`Z`, and joins the surviving
/// letters with single spaces so the tokenizer sees one letter per word.
pub fn prepare_letters(raw: &str) -> String {
    let letters: Vec<String> = raw
        .to_ascii_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase())
        .map(|c| c.to_string())
        .collect();
    letters.join(" ")
}

/// Builds the text-to-text prompt for a prepared letter sequence.
pub fn translation_prompt(prepared: &str) -> String {
    format!("translate ASL to English: {prepared}")
}

/// Cleans up model output into a presentable sentence.
///
/// Trims, capitalizes the first character, and appends a period when the
/// text does not already end in terminal punctuation.
pub fn finish_sentence(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let mut chars = trimmed.chars();
    let first = chars
        .next()
        .map(|c| c.to_uppercase().collect::<String>())
        .unwrap_or_default();
    let mut sentence = format!("{first}{}", chars.as_str());

    if !sentence.ends_with(['.', '!', '?']) {
        sentence.push('.');
    }
    sentence
}

/// Heuristic confidence for a prepared sequence.
///
/// Longer inputs give the model more to work with, capped at 0.95.
pub fn confidence_for(prepared: &str) -> f32 {
    (0.7 + prepared.len() as f32 * 0.01).min(0.95)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_strips_and_spaces() {
        assert_eq!(prepare_letters("hello"), "H E L L O");
        assert_eq!(prepare_letters("THANK YOU!"), "T H A N K Y O U");
        assert_eq!(prepare_letters("123"), "");
    }

    #[test]
    fn prompt_includes_prepared_sequence() {
        assert_eq!(
            translation_prompt("H I"),
            "translate ASL to English: H I"
        );
    }

    #[test]
    fn finish_capitalizes_and_punctuates() {
        assert_eq!(finish_sentence("hello world"), "Hello world.");
        assert_eq!(finish_sentence("  done!  "), "Done!");
        assert_eq!(finish_sentence(""), "");
    }

    #[test]
    fn confidence_grows_with_length_and_caps() {
        assert!((confidence_for("H I") - 0.73).abs() < 1e-6);
        assert!((confidence_for(&"A ".repeat(40)) - 0.95).abs() < 1e-6);
        assert!((confidence_for("") - 0.7).abs() < 1e-6);
    }
}
