//! Lexical helpers: tokenization, overlap scoring, size estimates.

use std::collections::HashSet;

/// Lowercased alphanumeric tokens of a text, as a set.
pub fn token_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Token-set Jaccard overlap in [0, 1]. Empty input on either side scores 0.
pub fn jaccard(text_a: &str, text_b: &str) -> f64 {
    let a = token_set(text_a);
    let b = token_set(text_b);
    jaccard_sets(&a, &b)
}

pub fn jaccard_sets(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Estimate tokens from text (chars / 4)
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Find a safe UTF-8 boundary at or before the given byte index.
pub fn safe_byte_boundary(s: &str, byte_idx: usize) -> usize {
    if byte_idx >= s.len() {
        return s.len();
    }
    let mut idx = byte_idx;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Truncate to at most `max_bytes`, appending an ellipsis when cut.
pub fn truncate(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let boundary = safe_byte_boundary(s, max_bytes);
    format!("{}…", &s[..boundary])
}

/// Strip matching surrounding quotes and unescape `\"`, `\'` and `\\`.
/// Unquoted input comes back unchanged.
pub fn unquote(raw: &str) -> String {
    let bytes = raw.as_bytes();
    if raw.len() < 2 {
        return raw.to_string();
    }
    let (first, last) = (bytes[0], bytes[raw.len() - 1]);
    if !((first == b'"' || first == b'\'') && first == last) {
        return raw.to_string();
    }
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(n @ ('"' | '\'' | '\\')) => out.push(n),
            Some(n) => {
                out.push('\\');
                out.push(n);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Inverse of `unquote` for single-quoted literals.
pub fn single_quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jaccard_identical_text_is_one() {
        assert_eq!(jaccard("memory safety rules", "Memory, safety; RULES"), 1.0);
    }

    #[test]
    fn jaccard_partial_overlap() {
        // {a, b} vs {b, c} → 1/3
        let score = jaccard("alpha beta", "beta gamma");
        assert!((score - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn jaccard_empty_is_zero() {
        assert_eq!(jaccard("", "anything"), 0.0);
        assert_eq!(jaccard("  ,, ", ""), 0.0);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "héllo wörld";
        let t = truncate(s, 2);
        assert!(t.starts_with('h'));
        assert!(t.ends_with('…'));
    }

    #[test]
    fn unquote_handles_escapes() {
        assert_eq!(unquote(r#""say \"hi\"""#), "say \"hi\"");
        assert_eq!(unquote(r"'what\'s new'"), "what's new");
        assert_eq!(unquote("'single'"), "single");
        assert_eq!(unquote("bare"), "bare");
        assert_eq!(unquote("\""), "\"");
    }

    #[test]
    fn single_quote_escapes_what_unquote_reads() {
        for s in ["what's new", r"C:\path", "plain", r"both \ and '"] {
            assert_eq!(unquote(&single_quote(s)), s);
        }
        assert_eq!(single_quote("it's"), r"'it\'s'");
    }
}
