//! Edit distance for fuzzy title matching.

/// Levenshtein distance between two strings, counted in `char`s.
///
/// Uses two rolling rows, so memory is linear in the shorter input.
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    let (a, b): (Vec<char>, Vec<char>) = (a.chars().collect(), b.chars().collect());
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return long.len();
    }

    let mut previous: Vec<usize> = (0..=short.len()).collect();
    let mut current = vec![0; short.len() + 1];
    for (i, lc) in long.iter().enumerate() {
        current[0] = i + 1;
        for (j, sc) in short.iter().enumerate() {
            let cost = usize::from(lc != sc);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[short.len()]
}

/// Lowercases, trims and truncates a title to `length` characters.
#[must_use]
pub fn comparable_title(title: &str, length: usize) -> String {
    title.to_lowercase().trim().chars().take(length).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("", "", 0 ; "both empty")]
    #[test_case("abc", "", 3 ; "one empty")]
    #[test_case("kitten", "sitting", 3 ; "classic")]
    #[test_case("colorless", "colourless", 1 ; "insertion")]
    #[test_case("flaw", "lawn", 2 ; "shifted")]
    #[test_case("über", "uber", 1 ; "unicode counts chars")]
    fn test_levenshtein(a: &str, b: &str, expected: usize) {
        assert_eq!(levenshtein(a, b), expected);
        assert_eq!(levenshtein(b, a), expected);
    }

    #[test]
    fn test_comparable_title() {
        assert_eq!(comparable_title("  Hello World  ", 5), "hello");
        assert_eq!(comparable_title("Short", 30), "short");
    }
}
