//! Shannon entropy over a character stream, shared by all feature
//! extractors. Values are rounded to three decimals so feature vectors
//! stay stable across platforms.

use std::collections::HashMap;

/// Shannon entropy of the character-frequency distribution of `text`.
/// Empty input yields 0.0.
pub fn shannon_entropy(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }

    let mut counts: HashMap<char, usize> = HashMap::new();
    let mut total = 0usize;
    for c in text.chars() {
        *counts.entry(c).or_insert(0) += 1;
        total += 1;
    }

    let total = total as f64;
    let entropy: f64 = counts
        .values()
        .map(|&n| {
            let p = n as f64 / total;
            -p * p.log2()
        })
        .sum();

    round3(entropy)
}

/// Round to three decimal places.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_string_is_zero() {
        assert_eq!(shannon_entropy(""), 0.0);
    }

    #[test]
    fn test_single_repeated_char_is_zero() {
        assert_eq!(shannon_entropy("a"), 0.0);
        assert_eq!(shannon_entropy("aaaaaaaaaaaaaaaa"), 0.0);
    }

    #[test]
    fn test_uniform_two_chars_is_one_bit() {
        assert_eq!(shannon_entropy("abab"), 1.0);
    }

    #[test]
    fn test_permutation_invariant() {
        let a = shannon_entropy("hello world");
        let b = shannon_entropy("dlrow olleh");
        assert_eq!(a, b);
    }

    #[test]
    fn test_rounded_to_three_decimals() {
        let e = shannon_entropy("abc");
        assert_eq!(e, 1.585);
    }
}
