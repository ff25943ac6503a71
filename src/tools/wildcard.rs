//! Wildcard matching of archive member names.
//! `*` matches any run of characters including none, `?` matches exactly one.

/// Match `text` against `pattern` left to right, backtracking to the most recent `*`
/// whenever a later character fails to match.
pub fn matches(text: &[u8],pattern: &[u8]) -> bool {
    let mut t = 0;
    let mut p = 0;
    // position of the last `*` seen, and where in the text it started matching
    let mut star: Option<(usize,usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p,t));
            p += 1;
        } else if let Some((star_p,star_t)) = star {
            // let the star swallow one more character
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p,t));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}

#[test]
fn star() {
    assert!(matches(b"a.txt",b"*.txt"));
    assert!(matches(b"a.b.txt",b"*.txt"));
    assert!(!matches(b"a.txt2",b"*.txt"));
    assert!(matches(b"anything",b"*"));
    assert!(matches(b"",b"*"));
    assert!(matches(b"abc",b"a*b*c"));
    assert!(matches(b"aXbYbc",b"a*b*c"));
    assert!(!matches(b"aXbYbd",b"a*b*c"));
}

#[test]
fn question() {
    assert!(matches(b"abc",b"a?c"));
    assert!(!matches(b"ac",b"a?c"));
    assert!(!matches(b"abbc",b"a?c"));
    assert!(matches(b"abbc",b"a*?c"));
}

#[test]
fn literal_and_empty() {
    assert!(matches(b"",b""));
    assert!(!matches(b"a",b""));
    assert!(!matches(b"",b"a"));
    assert!(matches(b"b.bin",b"b.bin"));
    // case as stored
    assert!(!matches(b"B.BIN",b"b.bin"));
}
