//! Block-level tokenizer.
//!
//! Rules are tried in a fixed priority order against the start of the
//! remaining input; the first that matches consumes its text and emits one
//! token. Blockquotes and list items are tokenized recursively.

use tracing::debug;

/// Maximum blockquote/list nesting before nested text is kept as a paragraph.
pub const MAX_NESTING: usize = 32;

/// One block-level element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Run of blank lines; renders to nothing.
    Space,
    Hr,
    Heading {
        depth: usize,
        text: String,
    },
    Code {
        lang: String,
        text: String,
    },
    Blockquote(Vec<Token>),
    List {
        ordered: bool,
        items: Vec<Vec<Token>>,
    },
    Paragraph(String),
    /// Raw HTML passed through verbatim.
    Html(String),
}

type Matched = Option<(usize, Token)>;

/// Tokenizes preprocessed markdown.
pub fn tokenize(src: &str) -> Vec<Token> {
    tokenize_nested(src, 0)
}

fn tokenize_nested(mut src: &str, depth: usize) -> Vec<Token> {
    let mut tokens = Vec::new();
    while !src.is_empty() {
        let matched = newline(src)
            .or_else(|| fences(src))
            .or_else(|| atx_heading(src))
            .or_else(|| setext_heading(src))
            .or_else(|| hr(src))
            .or_else(|| blockquote(src, depth))
            .or_else(|| list(src, depth))
            .or_else(|| html(src))
            .or_else(|| paragraph(src));

        if let Some((len, token)) = matched {
            tokens.push(token);
            src = &src[len..];
            continue;
        }

        let skipped = src.chars().next().map_or(1, char::len_utf8);
        debug!(near = %src.chars().take(20).collect::<String>(), "No block rule matched, skipping one character");
        src = &src[skipped..];
    }
    tokens
}

fn tokenize_child(content: &str, depth: usize) -> Vec<Token> {
    if depth + 1 >= MAX_NESTING {
        let text = content.trim();
        return if text.is_empty() {
            Vec::new()
        } else {
            vec![Token::Paragraph(text.to_string())]
        };
    }
    tokenize_nested(content, depth + 1)
}

// ----------------------------------------------------------------------------
// Scanning helpers
// ----------------------------------------------------------------------------

/// Index of the `\n` ending the line that contains `from`, or `src.len()`.
fn line_end(src: &str, from: usize) -> usize {
    src[from..].find('\n').map_or(src.len(), |i| from + i)
}

fn skip_byte(src: &str, from: usize, byte: u8) -> usize {
    from + src.as_bytes()[from..].iter().take_while(|b| **b == byte).count()
}

/// Number of leading spaces when there are at most three.
fn indent_upto3(src: &str) -> Option<usize> {
    let spaces = src.bytes().take_while(|b| *b == b' ').count();
    (spaces <= 3).then_some(spaces)
}

/// Length of a `*`, `+`, `-` or `N.` marker at the start of `src`.
fn list_marker_len(src: &str) -> Option<usize> {
    match src.as_bytes().first()? {
        b'*' | b'+' | b'-' => Some(1),
        _ => ordered_marker_len(src),
    }
}

fn ordered_marker_len(src: &str) -> Option<usize> {
    let digits = src.bytes().take_while(u8::is_ascii_digit).count();
    (digits > 0 && src.as_bytes().get(digits) == Some(&b'.')).then_some(digits + 1)
}

/// Up to three spaces, a list marker, then a space.
fn starts_list_item(line: &str) -> bool {
    let Some(indent) = indent_upto3(line) else {
        return false;
    };
    list_marker_len(&line[indent..])
        .is_some_and(|len| line.as_bytes().get(indent + len) == Some(&b' '))
}

/// Column-0 markers that end a list block.
fn interrupts_list(line: &str) -> bool {
    matches!(line.as_bytes().first(), Some(b'*' | b'+' | b'-' | b'>' | b'#'))
        || ordered_marker_len(line).is_some_and(|len| line.as_bytes().get(len) == Some(&b' '))
        || line.starts_with("```")
}

/// Lines that end a paragraph.
fn interrupts_paragraph(line: &str) -> bool {
    starts_list_item(line)
        || line.starts_with('>')
        || line.starts_with('#')
        || line.starts_with("```")
        || line.starts_with("---")
        || line.starts_with("===")
}

// ----------------------------------------------------------------------------
// Rules
// ----------------------------------------------------------------------------

fn newline(src: &str) -> Matched {
    let len = skip_byte(src, 0, b'\n');
    (len > 0).then_some((len, Token::Space))
}

fn fences(src: &str) -> Matched {
    let bytes = src.as_bytes();
    let indent = indent_upto3(src)?;
    let fence_char = *bytes.get(indent)?;
    if fence_char != b'`' && fence_char != b'~' {
        return None;
    }
    let fence_end = skip_byte(src, indent, fence_char);
    if fence_end - indent < 3 {
        return None;
    }
    let fence = &src[indent..fence_end];

    let info_end = src[fence_end..]
        .find(['`', '~', '\n'])
        .map_or(src.len(), |i| fence_end + i);
    if info_end < src.len() && bytes[info_end] != b'\n' {
        return None;
    }
    let lang = src[fence_end..info_end].trim().to_string();
    let body_start = (info_end + 1).min(src.len());

    let code = |end: usize, text: &str| {
        Some((
            end,
            Token::Code {
                lang: lang.clone(),
                text: text.to_string(),
            },
        ))
    };

    if let Some(end) = closing_fence(src, body_start, fence) {
        return code(end, "");
    }

    // Shortest body followed by a newline and a closing fence; an unclosed
    // fence runs to the end of the input.
    let mut pos = body_start;
    loop {
        if pos >= src.len() {
            return code(src.len(), &src[body_start..]);
        }
        if bytes[pos] == b'\n'
            && let Some(end) = closing_fence(src, pos + 1, fence)
        {
            return code(end, &src[body_start..pos]);
        }
        pos += 1;
    }
}

/// Matches a closing fence line at `at`; the end of input also closes.
fn closing_fence(src: &str, at: usize, fence: &str) -> Option<usize> {
    if at >= src.len() {
        return Some(src.len());
    }
    let line = &src[at..];
    let indent = indent_upto3(line)?;
    if !line[indent..].starts_with(fence) {
        return None;
    }
    let mut end = indent + fence.len();
    end += line[end..].bytes().take_while(|b| *b == b'`' || *b == b'~').count();
    end = skip_byte(line, end, b' ');
    match line.as_bytes().get(end) {
        None | Some(b'\n') => Some(at + end),
        Some(_) => None,
    }
}

fn atx_heading(src: &str) -> Matched {
    let indent = indent_upto3(src)?;
    let hashes_end = skip_byte(src, indent, b'#');
    let depth = hashes_end - indent;
    if depth == 0 || depth > 6 || src.as_bytes().get(hashes_end) != Some(&b' ') {
        return None;
    }
    let text_end = line_end(src, hashes_end + 1);
    let text = src[hashes_end + 1..text_end].trim().to_string();
    Some((skip_byte(src, text_end, b'\n'), Token::Heading { depth, text }))
}

fn setext_heading(src: &str) -> Matched {
    let first_end = line_end(src, 0);
    if first_end == 0 || first_end == src.len() {
        return None;
    }
    let underline = first_end + 1;
    let indent = indent_upto3(&src[underline..])?;
    let marker_start = underline + indent;
    let marker = *src.as_bytes().get(marker_start)?;
    if marker != b'=' && marker != b'-' {
        return None;
    }
    let marker_end = skip_byte(src, marker_start, marker);
    let end = skip_byte(src, marker_end, b' ');
    if end < src.len() && src.as_bytes()[end] != b'\n' {
        return None;
    }
    Some((
        skip_byte(src, end, b'\n'),
        Token::Heading {
            depth: if marker == b'=' { 1 } else { 2 },
            text: src[..first_end].to_string(),
        },
    ))
}

fn hr(src: &str) -> Matched {
    let indent = indent_upto3(src)?;
    let marker = *src.as_bytes().get(indent)?;
    if !matches!(marker, b'-' | b'_' | b'*') {
        return None;
    }
    let mut end = indent;
    let mut count = 0;
    while src.as_bytes().get(end) == Some(&marker) {
        count += 1;
        end = skip_byte(src, end + 1, b' ');
    }
    if count < 3 || (end < src.len() && src.as_bytes()[end] != b'\n') {
        return None;
    }
    Some((skip_byte(src, end, b'\n'), Token::Hr))
}

fn blockquote(src: &str, depth: usize) -> Matched {
    let mut end = 0;
    while end < src.len() {
        let line = &src[end..];
        let Some(indent) = indent_upto3(line) else {
            break;
        };
        if line.as_bytes().get(indent) != Some(&b'>') {
            break;
        }
        let eol = line_end(src, end);
        end = (eol + 1).min(src.len());
    }
    if end == 0 {
        return None;
    }

    let content = src[..end]
        .split('\n')
        .map(strip_quote_marker)
        .collect::<Vec<_>>()
        .join("\n");
    Some((end, Token::Blockquote(tokenize_child(&content, depth))))
}

/// Removes leading spaces, one `>` and one optional space.
fn strip_quote_marker(line: &str) -> &str {
    let trimmed = line.trim_start_matches(' ');
    match trimmed.strip_prefix('>') {
        Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
        None => line,
    }
}

fn list(src: &str, depth: usize) -> Matched {
    if !starts_list_item(src) {
        return None;
    }

    let mut end = line_end(src, 0);
    while end < src.len() {
        let next = end + 1;
        if interrupts_list(&src[next..]) {
            break;
        }
        end = line_end(src, next);
    }

    let block = &src[..end];
    let ordered = ordered_marker_len(block).is_some();
    let items = list_items(block)
        .into_iter()
        .map(|item| tokenize_child(&item, depth))
        .collect();
    Some((end, Token::List { ordered, items }))
}

/// Splits a list block into item bodies with their indentation removed.
fn list_items(block: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut pos = 0;
    while pos < block.len() {
        let line = &block[pos..];
        let indent = line.bytes().take_while(|b| *b == b' ').count();
        let item_start = list_marker_len(&line[indent..]).and_then(|marker| {
            let after_marker = indent + marker;
            let spaces = skip_byte(line, after_marker, b' ') - after_marker;
            (spaces > 0).then_some(after_marker + spaces)
        });

        let Some(body_offset) = item_start else {
            pos = line_end(block, pos) + 1;
            continue;
        };

        let body_start = pos + body_offset;
        let mut end = line_end(block, body_start);
        while end < block.len() && !starts_list_item(&block[end + 1..]) {
            end = line_end(block, end + 1);
        }

        let prefix = " ".repeat(indent);
        let body = block[body_start..end]
            .split('\n')
            .map(|l| l.strip_prefix(prefix.as_str()).unwrap_or(l))
            .collect::<Vec<_>>()
            .join("\n");
        items.push(body);
        pos = end + 1;
    }
    items
}

fn html(src: &str) -> Matched {
    let indent = indent_upto3(src)?;
    let rest = &src[indent..];
    if !rest.starts_with('<') {
        return None;
    }
    let len = raw_block_tag(rest)
        .or_else(|| delimited_to(rest, "<!--", "-->", false))
        .or_else(|| delimited_to(rest, "<?", "?>", true))
        .or_else(|| declaration(rest))
        .or_else(|| delimited_to(rest, "<![CDATA[", "]]>", true))
        .or_else(|| known_block_tag(rest))
        .or_else(|| lone_tag_line(rest))?;
    let end = indent + len;
    Some((end, Token::Html(src[..end].to_string())))
}

const RAW_TAGS: [&str; 4] = ["script", "pre", "style", "textarea"];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "base", "blockquote", "body", "caption", "center", "col",
    "colgroup", "dd", "details", "dialog", "dir", "div", "dl", "dt", "fieldset", "figcaption",
    "figure", "footer", "form", "frame", "frameset", "h1", "h2", "h3", "h4", "h5", "h6", "head",
    "header", "hr", "html", "iframe", "legend", "li", "link", "main", "menu", "nav", "ol", "p",
    "param", "section", "summary", "table", "tbody", "td", "tfoot", "th", "thead", "title", "tr",
    "track", "ul",
];

/// End of the first `\n\n` run at or after `from`, else the input length.
fn to_blank_line(src: &str, from: usize) -> usize {
    src[from..]
        .find("\n\n")
        .map_or(src.len(), |i| skip_byte(src, from + i, b'\n'))
}

/// `<script>`, `<pre>`, `<style>`, `<textarea>` up to the closing tag's line.
fn raw_block_tag(src: &str) -> Option<usize> {
    let name = RAW_TAGS
        .iter()
        .find(|tag| src[1..].starts_with(**tag))?;
    let after_name = 1 + name.len();
    let next = src[after_name..].chars().next()?;
    if next != '>' && !next.is_whitespace() {
        return None;
    }

    let close = format!("</{name}>");
    let mut search = after_name + next.len_utf8();
    while let Some(offset) = src[search..].find(&close) {
        let close_end = search + offset + close.len();
        let eol = line_end(src, close_end);
        if eol < src.len() {
            return Some(skip_byte(src, eol, b'\n'));
        }
        search = close_end;
    }
    Some(src.len())
}

/// `open ... close` (plus trailing newlines when `eat_newlines`), or to the end.
fn delimited_to(src: &str, open: &str, close: &str, eat_newlines: bool) -> Option<usize> {
    if !src.starts_with(open) {
        return None;
    }
    Some(
        src[open.len()..]
            .find(close)
            .map_or(src.len(), |i| {
                let end = open.len() + i + close.len();
                if eat_newlines {
                    skip_byte(src, end, b'\n')
                } else {
                    end
                }
            }),
    )
}

/// `<!X...>` declarations such as `<!DOCTYPE html>`.
fn declaration(src: &str) -> Option<usize> {
    let rest = src.strip_prefix("<!")?;
    if !rest.as_bytes().first()?.is_ascii_uppercase() {
        return None;
    }
    Some(rest[1..].find('>').map_or(src.len(), |i| {
        skip_byte(src, 3 + i + 1, b'\n')
    }))
}

/// Opening or closing tag from the block-level list, up to a blank line.
fn known_block_tag(src: &str) -> Option<usize> {
    let name_start = if src.starts_with("</") { 2 } else { 1 };
    let name_len = src[name_start..]
        .bytes()
        .take_while(u8::is_ascii_alphanumeric)
        .count();
    let name = &src[name_start..name_start + name_len];
    if !BLOCK_TAGS.contains(&name) {
        return None;
    }

    let after_name = name_start + name_len;
    let rest = &src[after_name..];
    let terminator = if rest.starts_with(' ') {
        skip_byte(src, after_name, b' ')
    } else if rest.starts_with('\n') || rest.starts_with('>') {
        after_name + 1
    } else if rest.starts_with("/>") {
        after_name + 2
    } else {
        return None;
    };
    Some(to_blank_line(src, terminator))
}

/// Any other lowercase tag standing alone on its line, up to a blank line.
fn lone_tag_line(src: &str) -> Option<usize> {
    let rest = &src[1..];
    if RAW_TAGS.iter().any(|tag| rest.starts_with(tag)) {
        return None;
    }
    if !rest.as_bytes().first()?.is_ascii_lowercase() {
        return None;
    }
    let name_len = rest
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'-')
        .count();
    let after_ws = rest[name_len..].trim_start();
    let after_slash = after_ws.strip_prefix('/').unwrap_or(after_ws);
    let after_tag = after_slash.strip_prefix('>')?;

    let tag_end = src.len() - after_tag.len();
    let line_rest = after_tag.trim_start_matches([' ', '\t']);
    if !(line_rest.is_empty() || line_rest.starts_with('\n')) {
        return None;
    }
    Some(to_blank_line(src, tag_end))
}

fn paragraph(src: &str) -> Matched {
    let mut end = line_end(src, 0);
    if end == 0 {
        return None;
    }
    while end < src.len() {
        let next = end + 1;
        let next_end = line_end(src, next);
        if next_end == next || interrupts_paragraph(&src[next..]) {
            break;
        }
        end = next_end;
    }
    Some((
        skip_byte(src, end, b'\n'),
        Token::Paragraph(src[..end].trim().to_string()),
    ))
}
