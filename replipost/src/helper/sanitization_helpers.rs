use regex::Regex;
use std::sync::OnceLock;

fn script_style_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<script[^>]*?>.*?</script\s*>|<style[^>]*?>.*?</style\s*>").expect("valid script/style regex")
    })
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"))
}

fn octet_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"%[a-fA-F0-9]{2}").expect("valid octet regex"))
}

fn whitespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\r\n\t ]+").expect("valid whitespace regex"))
}

/// Cleans a single-line text input: drops tags (and the contents of script and
/// style blocks), percent-encoded octets, and collapses whitespace.
pub fn sanitize_text_field(input: &str) -> String {
    let without_blocks = script_style_regex().replace_all(input, "");
    let without_tags = tag_regex().replace_all(&without_blocks, "");
    let without_octets = octet_regex().replace_all(&without_tags, "");
    whitespace_regex().replace_all(&without_octets, " ").trim().to_string()
}

/// Lowercases and keeps only `a-z`, `0-9`, `_` and `-`.
pub fn sanitize_key(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_field_strips_markup() {
        assert_eq!(sanitize_text_field("  <b>(Copy)</b>  "), "(Copy)");
        assert_eq!(sanitize_text_field("a<script>alert(1)</script>b"), "ab");
        assert_eq!(sanitize_text_field("line\n\tbreak   here"), "line break here");
        assert_eq!(sanitize_text_field("100%20off"), "100off");
        assert_eq!(sanitize_text_field("Q&A"), "Q&A");
        assert_eq!(sanitize_text_field("<i></i>"), "");
    }

    #[test]
    fn key_keeps_safe_characters() {
        assert_eq!(sanitize_key("Draft"), "draft");
        assert_eq!(sanitize_key("my_type-2 "), "my_type-2");
        assert_eq!(sanitize_key("pub<lish>"), "publish");
        assert_eq!(sanitize_key("é"), "");
    }
}
