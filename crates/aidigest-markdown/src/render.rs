use std::fmt::Write as _;

use crate::block::Token;
use crate::inline::parse_inline;

/// Escapes the five HTML-significant characters.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Renders a token tree to HTML, one element per line.
pub fn render(tokens: &[Token]) -> String {
    let mut html = String::new();
    for token in tokens {
        match token {
            Token::Space => {}
            Token::Hr => html.push_str("<hr>\n"),
            Token::Heading { depth, text } => {
                let _ = writeln!(html, "<h{depth}>{}</h{depth}>", parse_inline(text));
            }
            Token::Code { lang, text } => {
                let class = if lang.is_empty() {
                    String::new()
                } else {
                    format!(" class=\"language-{}\"", escape_html(lang))
                };
                let _ = writeln!(html, "<pre><code{class}>{}</code></pre>", escape_html(text));
            }
            Token::Blockquote(children) => {
                let _ = writeln!(html, "<blockquote>\n{}</blockquote>", render(children));
            }
            // Always `<ul>`: the ordered flag is not consulted.
            Token::List { items, .. } => {
                html.push_str("<ul>\n");
                for item in items {
                    let _ = writeln!(html, "<li>{}</li>", render(item).trim());
                }
                html.push_str("</ul>\n");
            }
            Token::Paragraph(text) => {
                let _ = writeln!(html, "<p>{}</p>", parse_inline(text));
            }
            Token::Html(raw) => html.push_str(raw),
        }
    }
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_render_code_block() {
        let tokens = vec![
            Token::Code {
                lang: "rust".to_string(),
                text: "a < b".to_string(),
            },
            Token::Code {
                lang: String::new(),
                text: String::new(),
            },
        ];
        assert_eq!(
            render(&tokens),
            "<pre><code class=\"language-rust\">a &lt; b</code></pre>\n<pre><code></code></pre>\n"
        );
    }

    #[test]
    fn test_render_ordered_list_as_ul() {
        let tokens = vec![Token::List {
            ordered: true,
            items: vec![vec![Token::Paragraph("one".to_string())]],
        }];
        assert_eq!(render(&tokens), "<ul>\n<li><p>one</p></li>\n</ul>\n");
    }
}
