//! Namespace-wildcard matching
//!
//! This module implements the NVDL namespace matching algorithm (ISO/IEC
//! 19757-4 §6.4.12): the predicate deciding whether two wildcard-bearing
//! namespace patterns can denote overlapping literal namespace values.
//!
//! A pattern's wildcard is a single designated character standing for an
//! unspecified span. An absent wildcard is `None`, a character that cannot
//! occur literally. Naive recursion over the two scan positions is
//! exponential on adversarial wildcard-heavy inputs, so the recursion is
//! memoized over the `(i1, i2)` index pair, bounding the state space to
//! `(len1 + 1) * (len2 + 1)`.

/// Decide whether two namespace patterns can denote the same namespace URI.
///
/// Equivalent to [`ns_matches_from`] with both scan positions at zero.
pub fn ns_matches(n1: &str, w1: Option<char>, n2: &str, w2: Option<char>) -> bool {
    ns_matches_from(n1, 0, w1, n2, 0, w2)
}

/// Decide whether two namespace patterns, read from the given char positions
/// onward, can denote overlapping literal namespace values.
///
/// Positions past the end of a pattern are treated as exhausted scans. The
/// cases, first satisfied wins:
///
/// 1. the two full patterns are identical strings;
/// 2. both scans are exhausted;
/// 3. one scan is exhausted and the other pattern's remaining characters are
///    exactly its own wildcard character;
/// 4. both current characters are equal, neither is its own pattern's
///    wildcard, and the scans match with both positions advanced;
/// 5. pattern 1's current character is its wildcard and the scans match with
///    position 2 advanced (the wildcard absorbs one character of pattern 2);
/// 6. symmetric to 5 with the roles swapped.
pub fn ns_matches_from(
    n1: &str,
    i1: usize,
    w1: Option<char>,
    n2: &str,
    i2: usize,
    w2: Option<char>,
) -> bool {
    // quick check
    if n1 == n2 {
        return true;
    }

    let a: Vec<char> = n1.chars().collect();
    let b: Vec<char> = n2.chars().collect();
    let i1 = i1.min(a.len());
    let i2 = i2.min(b.len());

    let mut matcher = Matcher {
        memo: vec![None; (a.len() + 1 - i1) * (b.len() + 1 - i2)],
        width: b.len() + 1 - i2,
        base1: i1,
        base2: i2,
        a,
        b,
        w1,
        w2,
    };
    matcher.matches(i1, i2)
}

/// Decide whether a namespace pattern covers a literal namespace URI.
///
/// This is the dispatch-time form of the predicate: the instance side carries
/// no wildcard.
pub fn pattern_matches_uri(pattern: &str, wildcard: Option<char>, uri: &str) -> bool {
    ns_matches(pattern, wildcard, uri, None)
}

struct Matcher {
    a: Vec<char>,
    b: Vec<char>,
    w1: Option<char>,
    w2: Option<char>,
    memo: Vec<Option<bool>>,
    width: usize,
    base1: usize,
    base2: usize,
}

impl Matcher {
    fn matches(&mut self, i1: usize, i2: usize) -> bool {
        let slot = (i1 - self.base1) * self.width + (i2 - self.base2);
        if let Some(known) = self.memo[slot] {
            return known;
        }
        // Every recursive step advances i1 + i2, so evaluation never re-enters
        // a pending (i1, i2) pair.
        let result = self.eval(i1, i2);
        self.memo[slot] = Some(result);
        result
    }

    fn eval(&mut self, i1: usize, i2: usize) -> bool {
        let exhausted1 = i1 >= self.a.len();
        let exhausted2 = i2 >= self.b.len();

        if exhausted1 && exhausted2 {
            return true;
        }
        if exhausted1 && rest_is_wildcard(&self.b, i2, self.w2)
            || exhausted2 && rest_is_wildcard(&self.a, i1, self.w1)
        {
            return true;
        }
        if !exhausted1 && !exhausted2 {
            let c1 = self.a[i1];
            let c2 = self.b[i2];
            if c1 == c2
                && Some(c1) != self.w1
                && Some(c2) != self.w2
                && self.matches(i1 + 1, i2 + 1)
            {
                return true;
            }
            if Some(c1) == self.w1 && self.matches(i1, i2 + 1) {
                return true;
            }
            if Some(c2) == self.w2 && self.matches(i1 + 1, i2) {
                return true;
            }
        }
        false
    }
}

/// Whether the remainder of `s` from `i` is exactly the single wildcard char
fn rest_is_wildcard(s: &[char], i: usize, wildcard: Option<char>) -> bool {
    match wildcard {
        Some(w) => s.len() == i + 1 && s[i] == w,
        None => false,
    }
}
