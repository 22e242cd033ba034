//! Raw header block parsing.

use std::collections::HashMap;

/// Parses a raw header block into a name → value map.
///
/// Lines may be separated by `\n`, `\r` or `\r\n`; blank lines are ignored.
/// Each line must start with a name made of ASCII alphanumerics, `_` or `-`
/// followed by `:`. Other lines are skipped. Values are trimmed and names keep
/// their original case. A repeated name keeps its last value.
pub fn parse_headers(raw: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for line in raw.split(['\r', '\n']).filter(|l| !l.is_empty()) {
        match split_header_line(line) {
            Some((name, value)) => {
                headers.insert(name.to_string(), value.to_string());
            }
            None => tracing::trace!(line, "skipping malformed header line"),
        }
    }
    headers
}

fn split_header_line(line: &str) -> Option<(&str, &str)> {
    let name_len = line
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'-')
        .count();
    if name_len == 0 || line.as_bytes().get(name_len) != Some(&b':') {
        return None;
    }
    Some((&line[..name_len], line[name_len + 1..].trim()))
}

/// Looks up a header by name, ignoring ASCII case.
pub fn header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_crlf_block() {
        let h = parse_headers("Content-Type: application/json\r\nX-Id: abc");
        assert_eq!(h.len(), 2);
        assert_eq!(h["Content-Type"], "application/json");
        assert_eq!(h["X-Id"], "abc");
    }

    #[test]
    fn ignores_blank_lines_and_mixed_endings() {
        let h = parse_headers("\n\nA: 1\r\rB: 2\n\r\nC:3\n");
        assert_eq!(h.len(), 3);
        assert_eq!(h["C"], "3");
    }

    #[test]
    fn keeps_colons_inside_values() {
        let h = parse_headers("Location: https://example.com:8443/files/1");
        assert_eq!(h["Location"], "https://example.com:8443/files/1");
    }

    #[test]
    fn skips_lines_without_valid_name() {
        let h = parse_headers("HTTP/1.1 200 OK\r\n: orphan\r\nBad Name: x\r\nGood: y");
        assert_eq!(h.len(), 1);
        assert_eq!(h["Good"], "y");
    }

    #[test]
    fn last_duplicate_wins() {
        let h = parse_headers("X-Tag: one\nX-Tag: two");
        assert_eq!(h["X-Tag"], "two");
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let h = parse_headers("content-type: text/html");
        assert_eq!(header(&h, "Content-Type"), Some("text/html"));
        assert_eq!(header(&h, "CONTENT-TYPE"), Some("text/html"));
        assert_eq!(header(&h, "X-Missing"), None);
    }
}
