//! Identifier sanitization for generated code

/// Keywords of the target language that cannot be used as identifiers
const KEYWORDS: &[&str] = &[
    "as", "break", "const", "continue", "crate", "else", "enum", "extern", "false", "fn", "for",
    "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref", "return",
    "self", "Self", "static", "struct", "super", "trait", "true", "type", "unsafe", "use",
    "where", "while", "async", "await", "dyn",
];

/// Convert a model id into a valid, lowercase identifier.
///
/// Non-alphanumeric characters become underscores, a leading digit gets an
/// underscore prefix, and keywords get a trailing underscore.
pub fn to_identifier(name: &str) -> String {
    let mut clean: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect::<String>()
        .to_lowercase();
    if clean.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        clean.insert(0, '_');
    }
    if clean.is_empty() {
        clean.push('_');
    }
    if KEYWORDS.contains(&clean.as_str()) {
        clean.push('_');
    }
    clean
}

/// Whether a name is already a usable identifier
pub fn is_valid_identifier(name: &str) -> bool {
    if name.is_empty() || KEYWORDS.contains(&name) {
        return false;
    }
    let mut chars = name.chars();
    let first = chars.next().expect("non-empty checked");
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn punctuation_becomes_underscores() {
        assert_eq!(to_identifier("Species-1"), "species_1");
        assert_eq!(to_identifier("k_cat"), "k_cat");
    }

    #[test]
    fn leading_digit_is_prefixed() {
        assert_eq!(to_identifier("1cmt"), "_1cmt");
    }

    #[test]
    fn keywords_are_suffixed() {
        assert_eq!(to_identifier("type"), "type_");
    }

    #[test]
    fn validity_check() {
        assert!(is_valid_identifier("k_cat"));
        assert!(!is_valid_identifier("3species"));
        assert!(!is_valid_identifier("let"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("a-b"));
    }
}
