//! Canonical-text ordering.
//!
//! Canonical texts of nested expressions very often share long prefixes
//! (`(and (var 'a') ...` against `(and (var 'a') ...`), so a plain
//! lexicographic comparison walks the whole common prefix before deciding.
//! [`compare_sexpr`] instead orders by length first and, for equal lengths,
//! compares bytes alternately from the front and the back, moving inward.

use std::cmp::Ordering;
use std::fmt;

/// Length-then-alternating-ends comparison of two canonical texts.
///
/// A total order: equal results only for byte-identical inputs.
pub fn compare_sexpr(a: &str, b: &str) -> Ordering {
    match a.len().cmp(&b.len()) {
        Ordering::Equal => {}
        other => return other,
    }

    let (a, b) = (a.as_bytes(), b.as_bytes());
    let mut front = 0;
    let mut back = a.len();
    while front < back {
        match a[front].cmp(&b[front]) {
            Ordering::Equal => {}
            other => return other,
        }
        front += 1;
        if front == back {
            break;
        }
        back -= 1;
        match a[back].cmp(&b[back]) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}

/// Owned canonical text ordered by [`compare_sexpr`], usable as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SexprKey(String);

impl SexprKey {
    pub fn new(text: impl Into<String>) -> Self {
        SexprKey(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for SexprKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_sexpr(&self.0, &other.0)
    }
}

impl PartialOrd for SexprKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SexprKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn shorter_sorts_first() {
        assert_eq!(compare_sexpr("(b)", "(aa)"), Ordering::Less);
        assert_eq!(compare_sexpr("(aaaa)", "(b)"), Ordering::Greater);
    }

    #[test]
    fn back_byte_decides_before_middle() {
        // Differ at index 1 and at the last index; the front wins first.
        assert_eq!(compare_sexpr("abz", "bay"), Ordering::Less);
        // Same front byte: the last byte decides, not the middle one.
        assert_eq!(compare_sexpr("azb", "aac"), Ordering::Less);
    }

    #[test]
    fn identical_texts_are_equal() {
        assert_eq!(compare_sexpr("(f 'x')", "(f 'x')"), Ordering::Equal);
        assert_eq!(compare_sexpr("", ""), Ordering::Equal);
    }

    proptest! {
        #[test]
        fn equal_only_when_identical(a in "[a-c()' ]{0,8}", b in "[a-c()' ]{0,8}") {
            let eq = compare_sexpr(&a, &b) == Ordering::Equal;
            prop_assert_eq!(eq, a == b);
        }

        #[test]
        fn antisymmetric(a in "[a-c]{0,6}", b in "[a-c]{0,6}") {
            prop_assert_eq!(compare_sexpr(&a, &b), compare_sexpr(&b, &a).reverse());
        }

        #[test]
        fn transitive(a in "[ab]{0,4}", b in "[ab]{0,4}", c in "[ab]{0,4}") {
            if compare_sexpr(&a, &b) != Ordering::Greater
                && compare_sexpr(&b, &c) != Ordering::Greater
            {
                prop_assert_ne!(compare_sexpr(&a, &c), Ordering::Greater);
            }
        }

        #[test]
        fn key_sort_matches_comparator(mut texts in proptest::collection::vec("[a-d]{0,5}", 0..12)) {
            let mut keys: Vec<SexprKey> = texts.iter().cloned().map(SexprKey::new).collect();
            keys.sort();
            texts.sort_by(|a, b| compare_sexpr(a, b));
            let sorted: Vec<&str> = keys.iter().map(SexprKey::as_str).collect();
            prop_assert_eq!(sorted, texts.iter().map(String::as_str).collect::<Vec<_>>());
        }
    }
}
