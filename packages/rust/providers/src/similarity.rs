//! Name similarity used to rank registry matches.

/// Lower-case, drop non-ASCII and punctuation, trim.
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_ascii_whitespace() || *c == '_')
        .collect::<String>()
        .to_ascii_lowercase()
        .trim()
        .to_string()
}

/// Best normalised Levenshtein similarity of `target` against
/// `candidates`, as a 0-100 score.
pub fn best_match<'a>(target: &str, candidates: impl IntoIterator<Item = &'a str>) -> u8 {
    let target = sanitize(target);
    if target.is_empty() {
        return 0;
    }
    let best = candidates
        .into_iter()
        .map(|c| strsim::normalized_levenshtein(&target, &sanitize(c)))
        .fold(0.0_f64, f64::max);
    (best * 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_punctuation() {
        assert_eq!(sanitize("  Joe's Café, LLC "), "joes caf llc");
    }

    #[test]
    fn best_match_picks_highest() {
        let score = best_match("Red Cross", ["Blue Shield", "red cross"]);
        assert_eq!(score, 100);
        assert_eq!(best_match("", ["anything"]), 0);
        assert_eq!(best_match("acme", std::iter::empty()), 0);
        assert_eq!(best_match("acme", [""]), 0);
    }

    #[test]
    fn best_match_scales_edit_distance() {
        // kitten -> sitting: 3 edits over 7 characters.
        assert_eq!(best_match("kitten", ["sitting"]), 57);
    }
}
