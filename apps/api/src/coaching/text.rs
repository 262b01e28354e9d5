//! Small text helpers shared by the analyzer and the extractor.

/// Lowercases, replaces everything except letters, digits and `%` with spaces,
/// and collapses whitespace. The result is padded with one space on each side
/// so whole-term lookups can use `contains(" term ")`.
pub fn normalize_padded(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    let mut last_space = true;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() || c == '%' {
            out.push(c);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    if !last_space {
        out.push(' ');
    }
    out
}

/// Normalizes a vocabulary term the same way as `normalize_padded`, without padding.
pub fn normalize_term(term: &str) -> String {
    normalize_padded(term).trim().to_string()
}

/// Whole-word (or whole-phrase) lookup of a normalized term in padded text.
pub fn contains_term(padded: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    padded.contains(&format!(" {term} "))
}

pub fn contains_any_term(padded: &str, terms: &[String]) -> bool {
    terms.iter().any(|t| contains_term(padded, t))
}

/// Returns `true` when `padded` starts with one of `terms` as a whole word.
pub fn starts_with_any_term(padded: &str, terms: &[String]) -> bool {
    terms
        .iter()
        .any(|t| !t.is_empty() && padded.starts_with(&format!(" {t} ")))
}

/// Uppercases the first character.
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}
