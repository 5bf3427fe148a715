// Unique display names with numeric suffixes.
//
// Given a candidate and the names already taken by active records of the
// same kind, pick the candidate itself or `candidate NN` one past the highest
// suffix in use. A bare candidate counts as suffix 1. Suffixes 2-9 are padded
// to two digits, larger ones render naturally.

/// Suffixes shorter than this are not treated as generated suffixes.
pub const MIN_SUFFIX_DIGITS: usize = 2;

/// Names that are empty or whitespace-only are exempt from uniqueness.
pub fn is_blank(candidate: &str) -> bool {
    candidate.trim().is_empty()
}

/// `candidate NN` for the given suffix.
pub fn with_suffix(candidate: &str, suffix: u64) -> String {
    format!("{candidate} {suffix:0width$}", width = MIN_SUFFIX_DIGITS)
}

/// The suffix `name` occupies relative to `candidate`, if it collides at all.
///
/// Returns `Some(1)` for the bare candidate, `Some(n)` for `candidate n`
/// with two or more digits, and `None` for unrelated names.
pub fn collision_suffix(candidate: &str, name: &str) -> Option<u64> {
    if name == candidate {
        return Some(1);
    }
    let digits = name.strip_prefix(candidate)?.strip_prefix(' ')?;
    if digits.len() < MIN_SUFFIX_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Resolve `candidate` against names already in use.
///
/// `taken` should list active names of the same kind, excluding the record
/// being renamed. Blank candidates are returned unchanged.
pub fn resolve_unique_name<'a, I>(candidate: &str, taken: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    if is_blank(candidate) {
        return candidate.to_owned();
    }

    let highest = taken.into_iter().filter_map(|name| collision_suffix(candidate, name)).max();

    match highest {
        None => candidate.to_owned(),
        Some(highest) => with_suffix(candidate, highest.saturating_add(1)),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn no_collision_keeps_candidate() {
        assert_eq!(resolve_unique_name("Acme", ["Globex", "Acme Corp"]), "Acme");
    }

    #[test]
    fn bare_collision_gets_suffix_02() {
        assert_eq!(resolve_unique_name("Acme", ["Acme"]), "Acme 02");
    }

    #[test]
    fn next_suffix_follows_highest_in_use() {
        assert_eq!(resolve_unique_name("Acme", ["Acme", "Acme 02", "Acme 05"]), "Acme 06");
    }

    #[test]
    fn suffix_ten_is_not_zero_padded_to_three_digits() {
        let taken = ["X", "X 02", "X 03", "X 04", "X 05", "X 06", "X 07", "X 08", "X 09"];
        assert_eq!(resolve_unique_name("X", taken), "X 10");
        assert_eq!(resolve_unique_name("X", ["X 10"]), "X 11");
    }

    #[test]
    fn single_digit_suffix_is_not_a_collision() {
        assert_eq!(resolve_unique_name("Acme", ["Acme 2"]), "Acme");
        assert_eq!(collision_suffix("Acme", "Acme 2"), None);
    }

    #[test]
    fn suffixed_name_alone_still_collides() {
        assert_eq!(resolve_unique_name("Acme", ["Acme 03"]), "Acme 04");
    }

    #[test]
    fn blank_candidates_are_returned_unchanged() {
        assert_eq!(resolve_unique_name("", [""]), "");
        assert_eq!(resolve_unique_name("   ", ["   "]), "   ");
    }

    #[test]
    fn suffix_parsing_ignores_non_digits() {
        assert_eq!(collision_suffix("Acme", "Acme 0x"), None);
        assert_eq!(collision_suffix("Acme", "Acme  02"), None);
        assert_eq!(collision_suffix("Acme", "Acme 007"), Some(7));
    }

    proptest! {
        #[test]
        fn sequential_creation_never_repeats_a_name(candidate in "[A-Za-z][A-Za-z ]{0,11}[A-Za-z]", count in 1usize..30) {
            let mut taken: Vec<String> = Vec::new();
            for _ in 0..count {
                let resolved = resolve_unique_name(&candidate, taken.iter().map(String::as_str));
                prop_assert!(!taken.contains(&resolved));
                taken.push(resolved);
            }
            prop_assert_eq!(&taken[0], &candidate);
        }
    }
}
