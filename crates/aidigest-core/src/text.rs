//! String cleanup shared by sources, reports and the RSS feed.

use std::sync::LazyLock;

use regex::Regex;

pub use aidigest_markdown::escape_html;

/// Host that serves article images and must go through the image proxy.
const IMAGE_UPLOAD_HOST: &str = "upload.chinaz.com";
const IMAGE_HOST: &str = "https://pic.chinaz.com";

fn compile(rules: &[(&str, &'static str)]) -> Vec<(Regex, &'static str)> {
    rules
        .iter()
        .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, *replacement)))
        .collect()
}

/// Media placeholders, then tag removal, then whitespace collapse.
static STRIP_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    compile(&[
        (
            r#"(?i)<img[^>]*src="([^"]*)"[^>]*alt="([^"]+)"[^>]*>"#,
            "[图片: $2 $1]",
        ),
        (r#"(?i)<img[^>]*src="([^"]*)"[^>]*>"#, "[图片: $1]"),
        (
            r#"(?i)<video[^>]*src="([^"]*)"[^>]*>.*?</video>"#,
            "[视频: $1]",
        ),
        (r"<[^>]+>", " "),
        (r"\s+", " "),
    ])
});

static BETWEEN_TAGS: LazyLock<Vec<(Regex, &'static str)>> =
    LazyLock::new(|| compile(&[(r">\s+<", "><")]));

fn apply(rules: &[(Regex, &'static str)], input: &str) -> String {
    rules.iter().fold(input.to_string(), |text, (re, replacement)| {
        re.replace_all(&text, *replacement).into_owned()
    })
}

/// Reduces HTML to plain text.
///
/// Images and videos become `[图片: ...]` / `[视频: ...]` placeholders so the
/// model still sees that media was present.
pub fn strip_html(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    apply(&STRIP_RULES, html).trim().to_string()
}

/// Removes whitespace between tags.
pub fn minify_html(html: &str) -> String {
    apply(&BETWEEN_TAGS, html).trim().to_string()
}

/// Strips a leading ```` ```json ```` / ```` ``` ```` fence and a trailing
/// ```` ``` ```` from model output.
pub fn remove_markdown_code_block(text: &str) -> String {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim().to_string()
}

/// Replaces ASCII double quotes with `“`.
pub fn to_chinese_quotes(text: &str) -> String {
    text.replace('"', "“")
}

/// Turns `“` and `”` back into ASCII double quotes before committing markdown.
pub fn from_chinese_quotes(text: &str) -> String {
    text.replace(['“', '”'], "\"")
}

/// Rewrites article image URLs so they load through `proxy`.
pub fn replace_image_proxy(proxy: &str, content: &str) -> String {
    let rehosted = content.replace(IMAGE_UPLOAD_HOST, "pic.chinaz.com");
    if proxy.is_empty() {
        return rehosted;
    }
    rehosted.replace(IMAGE_HOST, &format!("{proxy}{IMAGE_HOST}"))
}

/// First `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html_keeps_media_placeholders() {
        let html = r#"<p>Hello <b>world</b></p>
            <img class="x" src="https://a/1.png" alt="cat">
            <img src="https://a/2.png">
            <video src="https://a/v.mp4"><source></video>"#;
        assert_eq!(
            strip_html(html),
            "Hello world [图片: cat https://a/1.png] [图片: https://a/2.png] [视频: https://a/v.mp4]"
        );
        assert_eq!(strip_html(""), "");
    }

    #[test]
    fn test_minify_html() {
        assert_eq!(
            minify_html("  <p>a</p>\n  <p>b c</p>\n"),
            "<p>a</p><p>b c</p>"
        );
    }

    #[test]
    fn test_remove_markdown_code_block() {
        assert_eq!(remove_markdown_code_block("```json\n[\"a\"]\n```"), "[\"a\"]");
        assert_eq!(remove_markdown_code_block("  ```\n# Title\n```  "), "# Title");
        assert_eq!(remove_markdown_code_block("plain"), "plain");
        assert_eq!(remove_markdown_code_block(""), "");
    }

    #[test]
    fn test_quote_conversion() {
        assert_eq!(to_chinese_quotes(r#"say "hi""#), "say “hi“");
        assert_eq!(from_chinese_quotes("say “hi”"), r#"say "hi""#);
    }

    #[test]
    fn test_replace_image_proxy() {
        let md = "![a](https://upload.chinaz.com/1.png) ![b](https://pic.chinaz.com/2.png)";
        assert_eq!(
            replace_image_proxy("https://proxy/?u=", md),
            "![a](https://proxy/?u=https://pic.chinaz.com/1.png) ![b](https://proxy/?u=https://pic.chinaz.com/2.png)"
        );
        assert_eq!(
            replace_image_proxy("", md),
            "![a](https://pic.chinaz.com/1.png) ![b](https://pic.chinaz.com/2.png)"
        );
    }

    #[test]
    fn test_truncate_chars_is_char_based() {
        assert_eq!(truncate_chars("你好世界", 2), "你好");
        assert_eq!(truncate_chars("ab", 10), "ab");
    }
}
