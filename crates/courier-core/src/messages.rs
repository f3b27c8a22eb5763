//! Message sources for bulk sends (inline text or an uploaded file).

/// Split a message source into one message per line, dropping blank lines.
pub fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.to_string())
        .collect()
}

/// Decode uploaded bytes as UTF-8 (lossy: a stray byte must not reject a whole file).
pub fn parse_upload(bytes: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
    parse_lines(text)
}

pub fn is_blank(message: &str) -> bool {
    message.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_lines_drops_blank_and_crlf() {
        let got = parse_lines("hello\r\n\r\n   \nworld\n");
        assert_eq!(got, vec!["hello".to_string(), "world".to_string()]);
    }

    #[test]
    fn parse_lines_keeps_inner_whitespace() {
        assert_eq!(parse_lines("  indented text "), vec!["  indented text "]);
    }

    #[test]
    fn parse_upload_strips_bom() {
        let got = parse_upload("\u{feff}first\nsecond".as_bytes());
        assert_eq!(got, vec!["first", "second"]);
    }

    #[test]
    fn only_blank_input_yields_nothing() {
        assert!(parse_lines("\n \t\n\r\n").is_empty());
    }
}
