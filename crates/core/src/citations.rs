use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static CITATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[Source (\d+)\]").expect("citation regex"));
static CITATION_WITH_SPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" ?\[Source (\d+)\]").expect("citation regex"));

/// Distinct citation numbers appearing in generated text, ascending.
pub fn extract_citations(text: &str) -> Vec<usize> {
    let mut seen: Vec<usize> = CITATION
        .captures_iter(text)
        .filter_map(|c| c[1].parse::<usize>().ok())
        .collect();
    seen.sort_unstable();
    seen.dedup();
    seen
}

/// Citation numbers in first-appearance order, keeping only 1..=max_source.
pub fn cited_in_order(text: &str, max_source: usize) -> Vec<usize> {
    let mut order = Vec::new();
    for caps in CITATION.captures_iter(text) {
        if let Ok(n) = caps[1].parse::<usize>() {
            if n >= 1 && n <= max_source && !order.contains(&n) {
                order.push(n);
            }
        }
    }
    order
}

/// Remove `[Source N]` tokens that reference sources outside 1..=max_source,
/// together with one directly preceding space. Returns the cleaned text and
/// whether anything was removed.
pub fn sanitize_citations(text: &str, max_source: usize) -> (String, bool) {
    let mut removed = false;
    let cleaned = CITATION_WITH_SPACE.replace_all(text, |caps: &Captures| {
        let n: usize = caps[1].parse().unwrap_or(0);
        if n >= 1 && n <= max_source {
            caps[0].to_string()
        } else {
            removed = true;
            String::new()
        }
    });
    (cleaned.into_owned(), removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_distinct_sorted_citations() {
        let text = "claim [Source 2], more [Source 1], again [Source 2]";
        assert_eq!(extract_citations(text), vec![1, 2]);
    }

    #[test]
    fn sanitize_drops_out_of_range_citations() {
        let text = "claim [Source 1] and bogus [Source 99] end";
        let (cleaned, removed) = sanitize_citations(text, 2);
        assert!(removed);
        assert_eq!(cleaned, "claim [Source 1] and bogus end");
    }

    #[test]
    fn sanitize_keeps_valid_citations_untouched() {
        let text = "claim [Source 1] and [Source 2]";
        let (cleaned, removed) = sanitize_citations(text, 2);
        assert!(!removed);
        assert_eq!(cleaned, text);
    }

    #[test]
    fn sanitize_removes_zero_citation() {
        let (cleaned, removed) = sanitize_citations("odd [Source 0] token", 3);
        assert!(removed);
        assert_eq!(cleaned, "odd token");
    }

    #[test]
    fn cited_in_order_preserves_first_appearance() {
        let text = "see [Source 3] then [Source 1] then [Source 3] then [Source 7]";
        assert_eq!(cited_in_order(text, 4), vec![3, 1]);
    }

    #[test]
    fn no_citations_yields_empty() {
        assert!(extract_citations("plain prose").is_empty());
        let (cleaned, removed) = sanitize_citations("plain prose", 0);
        assert!(!removed);
        assert_eq!(cleaned, "plain prose");
    }
}
