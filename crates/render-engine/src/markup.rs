//! Block and inline structure of slide markdown.
//!
//! Only the subset that slides use is recognised; anything else renders as
//! plain paragraph text.

use tokslides_project_model::slide::{parse_image_line, ImageRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanStyle {
    Plain,
    Bold,
    Italic,
    Code,
}

/// A run of text with one style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub style: SpanStyle,
}

impl Span {
    fn new(text: impl Into<String>, style: SpanStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMarker {
    Bullet,
    Ordered(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, spans: Vec<Span> },
    Paragraph { spans: Vec<Span> },
    ListItem { marker: ListMarker, spans: Vec<Span> },
    Quote { spans: Vec<Span> },
    Code { lines: Vec<String> },
    Image(ImageRef),
}

/// Parse slide content into blocks.
pub fn parse_blocks(content: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut quote: Vec<&str> = Vec::new();
    let mut code: Option<Vec<String>> = None;

    let flush = |blocks: &mut Vec<Block>, paragraph: &mut Vec<&str>, quote: &mut Vec<&str>| {
        if !paragraph.is_empty() {
            blocks.push(Block::Paragraph {
                spans: parse_inline(&paragraph.join(" ")),
            });
            paragraph.clear();
        }
        if !quote.is_empty() {
            blocks.push(Block::Quote {
                spans: parse_inline(&quote.join(" ")),
            });
            quote.clear();
        }
    };

    for raw in content.lines() {
        if let Some(lines) = code.as_mut() {
            if raw.trim_start().starts_with("```") {
                blocks.push(Block::Code {
                    lines: std::mem::take(lines),
                });
                code = None;
            } else {
                lines.push(raw.trim_end().to_string());
            }
            continue;
        }

        let line = raw.trim();
        if line.starts_with("```") {
            flush(&mut blocks, &mut paragraph, &mut quote);
            code = Some(Vec::new());
            continue;
        }
        if line.is_empty() {
            flush(&mut blocks, &mut paragraph, &mut quote);
            continue;
        }
        if let Some(text) = line.strip_prefix('>') {
            if !paragraph.is_empty() {
                flush(&mut blocks, &mut paragraph, &mut quote);
            }
            quote.push(text.trim());
            continue;
        }

        flush(&mut blocks, &mut paragraph, &mut quote);

        if let Some((level, text)) = heading(line) {
            blocks.push(Block::Heading {
                level,
                spans: parse_inline(text),
            });
        } else if let Some((marker, text)) = list_item(line) {
            blocks.push(Block::ListItem {
                marker,
                spans: parse_inline(text),
            });
        } else if let Some(image) = parse_image_line(line) {
            blocks.push(Block::Image(image));
        } else {
            paragraph.push(line);
        }
    }

    // Unterminated fence: keep what was written.
    if let Some(lines) = code {
        blocks.push(Block::Code { lines });
    }
    flush(&mut blocks, &mut paragraph, &mut quote);
    blocks
}

fn heading(line: &str) -> Option<(u8, &str)> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    Some((hashes as u8, rest.trim()))
}

fn list_item(line: &str) -> Option<(ListMarker, &str)> {
    if let Some(text) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return Some((ListMarker::Bullet, text.trim()));
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let text = line[digits..].strip_prefix(". ")?;
    let n = line[..digits].parse().ok()?;
    Some((ListMarker::Ordered(n), text.trim()))
}

/// Split inline emphasis into styled spans. Unclosed markers stay literal.
pub fn parse_inline(text: &str) -> Vec<Span> {
    let mut spans: Vec<Span> = Vec::new();
    let mut plain = String::new();
    let mut rest = text;

    while let Some(ch) = rest.chars().next() {
        let marker = if rest.starts_with("**") {
            Some(("**", SpanStyle::Bold))
        } else if ch == '`' {
            Some(("`", SpanStyle::Code))
        } else if ch == '*' {
            Some(("*", SpanStyle::Italic))
        } else {
            None
        };

        let Some((delim, style)) = marker else {
            plain.push(ch);
            rest = &rest[ch.len_utf8()..];
            continue;
        };

        let inner = &rest[delim.len()..];
        let closing = inner.find(delim).filter(|&end| {
            end > 0
                && !inner.starts_with(char::is_whitespace)
                && !inner[..end].ends_with(char::is_whitespace)
        });
        match closing {
            Some(end) => {
                if !plain.is_empty() {
                    spans.push(Span::new(std::mem::take(&mut plain), SpanStyle::Plain));
                }
                spans.push(Span::new(&inner[..end], style));
                rest = &inner[end + delim.len()..];
            }
            None => {
                plain.push_str(delim);
                rest = inner;
            }
        }
    }

    if !plain.is_empty() {
        spans.push(Span::new(plain, SpanStyle::Plain));
    }
    spans
}
