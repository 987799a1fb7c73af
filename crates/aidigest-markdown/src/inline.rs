//! Span-level markup: images, links, code spans, emphasis and line breaks.
//!
//! Each construct is one left-to-right pass over the output of the previous
//! pass, so later passes also see markup produced by earlier ones.

use crate::render::escape_html;

/// Converts inline markdown to HTML.
///
/// Single `*x*` / `_x_` emphasis is intentionally left as literal text.
pub fn parse_inline(text: &str) -> String {
    let index = BracketIndex::new(text);
    let html = replace_matches(text, |s, i| match_image(s, i, &index));
    let index = BracketIndex::new(&html);
    let html = replace_matches(&html, |s, i| match_link(s, i, &index));
    let ticks = NextIndex::of_char(&html, |c| c == '`');
    let html = replace_matches(&html, |s, i| match_code_span(s, i, &ticks));
    let html = delimited_pass(&html, &["***", "___"], "<strong><em>", "</em></strong>");
    let html = delimited_pass(&html, &["**", "__"], "<strong>", "</strong>");
    let html = delimited_pass(&html, &["~~"], "<del>", "</del>");
    replace_matches(&html, match_hard_break)
}

/// Runs `matcher` at every char boundary, splicing in replacements.
///
/// A successful match resumes scanning at its end; otherwise one char is
/// copied through.
fn replace_matches<F>(text: &str, mut matcher: F) -> String
where
    F: FnMut(&str, usize) -> Option<(usize, String)>,
{
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < text.len() {
        if let Some((end, replacement)) = matcher(text, i) {
            out.push_str(&replacement);
            i = end;
            continue;
        }
        let Some(ch) = text[i..].chars().next() else {
            break;
        };
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Offset of the next occurrence of a needle at or after every byte offset.
///
/// Built in one reverse pass so matchers never rescan the rest of the text.
struct NextIndex(Vec<Option<usize>>);

impl NextIndex {
    fn build(len: usize, is_match: impl Fn(usize) -> bool) -> Self {
        let mut next = vec![None; len + 1];
        for offset in (0..len).rev() {
            next[offset] = if is_match(offset) {
                Some(offset)
            } else {
                next[offset + 1]
            };
        }
        Self(next)
    }

    fn of_char(s: &str, pred: impl Fn(char) -> bool) -> Self {
        Self::build(s.len(), |offset| {
            s.get(offset..)
                .and_then(|rest| rest.chars().next())
                .is_some_and(&pred)
        })
    }

    fn of_str(s: &str, needle: &str) -> Self {
        Self::build(s.len(), |offset| {
            s.is_char_boundary(offset) && s.as_bytes()[offset..].starts_with(needle.as_bytes())
        })
    }

    fn at(&self, offset: usize) -> Option<usize> {
        self.0.get(offset).copied().flatten()
    }
}

/// Lookups used by images and links.
struct BracketIndex {
    close: NextIndex,
    target_end: NextIndex,
    non_space: NextIndex,
    quote: NextIndex,
}

impl BracketIndex {
    fn new(s: &str) -> Self {
        Self {
            close: NextIndex::of_char(s, |c| c == ']'),
            target_end: NextIndex::of_char(s, |c| c == ')' || c.is_whitespace()),
            non_space: NextIndex::of_char(s, |c| !c.is_whitespace()),
            quote: NextIndex::of_char(s, |c| c == '"'),
        }
    }
}

/// Parsed `[label](target "title")` tail shared by images and links.
struct Bracketed<'a> {
    label: &'a str,
    target: &'a str,
    title: Option<&'a str>,
    end: usize,
}

/// Matches `[label](target)` or `[label](target "title")` starting at `i`.
fn match_bracketed<'a>(s: &'a str, i: usize, index: &BracketIndex) -> Option<Bracketed<'a>> {
    if !s.get(i..)?.starts_with('[') {
        return None;
    }
    let label_start = i + 1;
    let label_end = index.close.at(label_start)?;
    if label_end == label_start || !s[label_end + 1..].starts_with('(') {
        return None;
    }

    let target_start = label_end + 2;
    let target_end = index.target_end.at(target_start).unwrap_or(s.len());
    if target_end == target_start {
        return None;
    }
    let label = &s[label_start..label_end];
    let target = &s[target_start..target_end];

    if s[target_end..].starts_with(')') {
        return Some(Bracketed {
            label,
            target,
            title: None,
            end: target_end + 1,
        });
    }

    // Whitespace, then a quoted title, then `)`.
    let title_open = index.non_space.at(target_end).unwrap_or(s.len());
    if title_open == target_end || !s[title_open..].starts_with('"') {
        return None;
    }
    let title_start = title_open + 1;
    let title_end = index.quote.at(title_start)?;
    if title_end == title_start || !s[title_end + 1..].starts_with(')') {
        return None;
    }
    Some(Bracketed {
        label,
        target,
        title: Some(&s[title_start..title_end]),
        end: title_end + 2,
    })
}

fn title_attr(title: Option<&str>) -> String {
    title.map_or_else(String::new, |t| format!(" title=\"{}\"", escape_html(t)))
}

fn match_image(s: &str, i: usize, index: &BracketIndex) -> Option<(usize, String)> {
    if !s[i..].starts_with("![") {
        return None;
    }
    let image = match_bracketed(s, i + 1, index)?;
    Some((
        image.end,
        format!(
            "<img src=\"{}\" alt=\"{}\"{}>",
            escape_html(image.target),
            escape_html(image.label),
            title_attr(image.title)
        ),
    ))
}

fn match_link(s: &str, i: usize, index: &BracketIndex) -> Option<(usize, String)> {
    let link = match_bracketed(s, i, index)?;
    Some((
        link.end,
        format!(
            "<a href=\"{}\"{}>{}</a>",
            escape_html(link.target),
            title_attr(link.title),
            parse_inline(link.label)
        ),
    ))
}

fn match_code_span(s: &str, i: usize, ticks: &NextIndex) -> Option<(usize, String)> {
    if !s[i..].starts_with('`') {
        return None;
    }
    let close = ticks.at(i + 1)?;
    if close == i + 1 {
        return None;
    }
    Some((close + 1, format!("<code>{}</code>", escape_html(&s[i + 1..close]))))
}

fn is_line_terminator(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

/// Lookups for one emphasis pass: each delimiter plus line ends.
struct DelimitedIndex<'d> {
    delimiters: Vec<(&'d str, NextIndex)>,
    line_end: NextIndex,
}

fn delimited_pass(text: &str, delimiters: &[&str], open: &str, close: &str) -> String {
    let index = DelimitedIndex {
        delimiters: delimiters
            .iter()
            .map(|d| (*d, NextIndex::of_str(text, d)))
            .collect(),
        line_end: NextIndex::of_char(text, is_line_terminator),
    };
    replace_matches(text, |s, i| match_delimited(s, i, &index, open, close))
}

/// Matches `D content D` on a single line with non-empty content, taking the
/// nearest closing delimiter.
fn match_delimited(
    s: &str,
    i: usize,
    index: &DelimitedIndex<'_>,
    open: &str,
    close: &str,
) -> Option<(usize, String)> {
    let rest = &s[i..];
    let (delimiter, next) = index.delimiters.iter().find(|(d, _)| rest.starts_with(d))?;
    let body_start = i + delimiter.len();

    let first = s[body_start..]
        .chars()
        .next()
        .filter(|c| !is_line_terminator(*c))?;
    let line_end = index.line_end.at(body_start).unwrap_or(s.len());
    let content_end = next
        .at(body_start + first.len_utf8())
        .filter(|&at| at < line_end)?;

    Some((
        content_end + delimiter.len(),
        format!("{open}{}{close}", &s[body_start..content_end]),
    ))
}

/// Two or more spaces before a newline. Only tried at the start of a space
/// run; a shorter suffix of the same run ends at the same place.
fn match_hard_break(s: &str, i: usize) -> Option<(usize, String)> {
    if i > 0 && s.as_bytes()[i - 1] == b' ' {
        return None;
    }
    let rest = &s[i..];
    let spaces = rest.bytes().take_while(|b| *b == b' ').count();
    if spaces >= 2 && rest[spaces..].starts_with('\n') {
        Some((i + spaces + 1, "<br>\n".to_string()))
    } else {
        None
    }
}
