use std::collections::BTreeSet;

use finreg_core::compliance::PatternTable;
use finreg_core::domain::Warning;

const MARKER_PREFIX: &str = "[[source:";

/// Citation marker for the `n`th (1-based) excerpt in a prompt.
pub fn source_marker(n: usize) -> String {
    format!("{MARKER_PREFIX}{n}]]")
}

/// Source numbers cited in `answer` via `[[source:N]]` markers.
pub fn cited_sources(answer: &str) -> BTreeSet<usize> {
    let mut out = BTreeSet::new();
    let mut rest = answer;
    while let Some(pos) = rest.find(MARKER_PREFIX) {
        let after = &rest[pos + MARKER_PREFIX.len()..];
        match after.find("]]") {
            Some(end) => {
                if let Ok(n) = after[..end].trim().parse::<usize>() {
                    out.insert(n);
                }
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    out
}

/// Cited source numbers that do not refer to one of the `available` excerpts.
pub fn unknown_citations(answer: &str, available: usize) -> Vec<usize> {
    cited_sources(answer)
        .into_iter()
        .filter(|n| *n == 0 || *n > available)
        .collect()
}

/// Warnings for generated text that appears to encourage prohibited conduct.
pub fn screen_answer(answer: &str, table: &PatternTable) -> Vec<Warning> {
    let warnings = table.scan(&[answer]);
    if !warnings.is_empty() {
        tracing::warn!(count = warnings.len(), "generated answer flagged by response screening");
    }
    warnings
}

/// Append `extra` warnings not already present by (category, pattern).
pub fn merge_warnings(warnings: &mut Vec<Warning>, extra: Vec<Warning>) {
    for w in extra {
        if !warnings
            .iter()
            .any(|x| x.category == w.category && x.pattern == w.pattern)
        {
            warnings.push(w);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finreg_core::compliance::{default_response_patterns, CATEGORY_RESPONSE_CHECK};

    #[test]
    fn parses_source_markers() {
        let answer = "PAN is mandatory [[source:1]]. Fees vary [[ source:2]] [[source: 3 ]] [[source:x]]";
        assert_eq!(cited_sources(answer), BTreeSet::from([1, 3]));
        assert_eq!(unknown_citations("see [[source:4]] and [[source:0]]", 3), vec![0, 4]);
        assert!(cited_sources("no markers [[source:2").is_empty());
    }

    #[test]
    fn flags_encouraging_answers() {
        let table = default_response_patterns().unwrap();
        let w = screen_answer("You can quietly profit from insider trading before results.", table);
        assert!(w.iter().all(|w| w.category == CATEGORY_RESPONSE_CHECK));
        assert!(!w.is_empty());
        assert!(screen_answer("Insider trading is prohibited.", table).is_empty());
    }
}
