//! Delimited token scanning shared by `${...}` and `#{...}` handling

/// Replace every `open ... close` token in `text` with the handler's output.
///
/// A backslash directly before `open` escapes it: the backslash is dropped and
/// the opening marker is kept as literal text. An opening marker without a
/// matching close is kept verbatim along with the rest of the text.
pub fn parse_tokens<F, E>(text: &str, open: &str, close: &str, mut handler: F) -> Result<String, E>
where
    F: FnMut(&str) -> Result<String, E>,
{
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(open) {
        if start > 0 && rest[..start].ends_with('\\') {
            out.push_str(&rest[..start - 1]);
            out.push_str(open);
            rest = &rest[start + open.len()..];
            continue;
        }

        out.push_str(&rest[..start]);
        let after_open = &rest[start + open.len()..];
        match after_open.find(close) {
            Some(end) => {
                out.push_str(&handler(&after_open[..end])?);
                rest = &after_open[end + close.len()..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upper(text: &str) -> String {
        parse_tokens::<_, ()>(text, "${", "}", |t| Ok(t.to_uppercase())).unwrap()
    }

    #[test]
    fn test_replaces_tokens() {
        assert_eq!(upper("a ${b} c ${d}"), "a B c D");
    }

    #[test]
    fn test_escaped_open_is_literal() {
        assert_eq!(upper("a \\${b} ${c}"), "a ${b} C");
    }

    #[test]
    fn test_unclosed_token_kept() {
        assert_eq!(upper("a ${b"), "a ${b");
    }

    #[test]
    fn test_handler_error_propagates() {
        let result = parse_tokens(" #{x}", "#{", "}", |_| Err("boom"));
        assert_eq!(result, Err("boom"));
    }
}
