/// Normalized Indel similarity in `[0, 100]`, computed over Unicode scalar
/// values: `100 * 2 * LCS / (len(a) + len(b))`. Two empty strings score 100.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    let lcs = longest_common_subsequence(&a, &b);
    100.0 * (2 * lcs) as f64 / total as f64
}

/// Case-insensitive variant used for OCR scoring.
pub fn similarity_ratio_ignore_case(a: &str, b: &str) -> f64 {
    similarity_ratio(&a.to_lowercase(), &b.to_lowercase())
}

fn longest_common_subsequence(a: &[char], b: &[char]) -> usize {
    // Keep the shorter sequence on the inner axis.
    let (outer, inner) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let mut previous = vec![0usize; inner.len() + 1];
    let mut current = vec![0usize; inner.len() + 1];

    for &x in outer {
        for (j, &y) in inner.iter().enumerate() {
            current[j + 1] = if x == y {
                previous[j] + 1
            } else {
                current[j].max(previous[j + 1])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[inner.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn identical_strings_score_100() {
        assert!(approx(similarity_ratio("DOLIPRANE", "DOLIPRANE"), 100.0));
        assert!(approx(similarity_ratio("", ""), 100.0));
    }

    #[test]
    fn disjoint_or_one_empty_scores_0() {
        assert!(approx(similarity_ratio("abc", "xyz"), 0.0));
        assert!(approx(similarity_ratio("abc", ""), 0.0));
        assert!(approx(similarity_ratio("", "abc"), 0.0));
    }

    #[test]
    fn matches_indel_ratio() {
        // LCS("kitten", "sitting") = 4 ("ittn"), 2*4/13
        assert!(approx(similarity_ratio("kitten", "sitting"), 800.0 / 13.0));
        // LCS = 3 ("abd")
        assert!(approx(similarity_ratio("abcd", "abed"), 75.0));
    }

    #[test]
    fn symmetric() {
        let a = "1 comprimé, 3 fois par jour (orale)";
        let b = "1 comprime 3 fois par jour (orale";
        assert!(approx(similarity_ratio(a, b), similarity_ratio(b, a)));
    }

    #[test]
    fn counts_characters_not_bytes() {
        // "é" is two bytes; one substitution out of 2 chars each
        assert!(approx(similarity_ratio("é1", "e1"), 50.0));
    }

    #[test]
    fn case_insensitive_variant() {
        assert!(approx(similarity_ratio_ignore_case("AMOXICILLINE", "amoxicilline"), 100.0));
        assert!(similarity_ratio("AMOXICILLINE", "amoxicilline") < 1.0);
    }
}
