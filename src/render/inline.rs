//! Single-asterisk emphasis.
//!
//! `regex` has no look-around, so the "`*` not adjacent to another `*`"
//! rule is applied by hand. Adjacency is checked against the input text,
//! not the partially rewritten output.

/// Rewrite `*text*` as `<em>text</em>`.
///
/// The opening `*` must not follow a `*`, the closing one is the next `*`
/// after it and must not be followed by a `*`. The body may span lines.
pub(crate) fn convert_emphasis(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'*' || (i > 0 && bytes[i - 1] == b'*') {
            i += 1;
            continue;
        }
        let Some(offset) = bytes[i + 1..].iter().position(|&b| b == b'*') else {
            break;
        };
        let close = i + 1 + offset;
        let closes_cleanly = close > i + 1 && bytes.get(close + 1) != Some(&b'*');
        if !closes_cleanly {
            i += 1;
            continue;
        }

        out.push_str(&text[copied..i]);
        out.push_str("<em>");
        out.push_str(&text[i + 1..close]);
        out.push_str("</em>");
        copied = close + 1;
        i = close + 1;
    }

    out.push_str(&text[copied..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_emphasis() {
        assert_eq!(convert_emphasis("an *important* word"), "an <em>important</em> word");
    }

    #[test]
    fn test_double_asterisks_are_left_alone() {
        assert_eq!(convert_emphasis("**not em**"), "**not em**");
        assert_eq!(convert_emphasis("a ** b"), "a ** b");
    }

    #[test]
    fn test_unclosed_and_multiple() {
        assert_eq!(convert_emphasis("5 * 3"), "5 * 3");
        assert_eq!(convert_emphasis("*a* and *b*"), "<em>a</em> and <em>b</em>");
        assert_eq!(convert_emphasis("*你好*"), "<em>你好</em>");
    }

    #[test]
    fn test_spans_lines() {
        assert_eq!(convert_emphasis("*one\ntwo*"), "<em>one\ntwo</em>");
    }
}
