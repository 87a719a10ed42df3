//! Slide decks authored as a single markdown document.
//!
//! Slides are separated by lines consisting of exactly `---`. A slide may
//! carry a `<!-- layout: NAME -->` comment choosing where its content sits on
//! the vertical canvas.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default width hint (logical units) for images without an explicit title.
pub const DEFAULT_IMAGE_WIDTH: u32 = 280;

pub const MIN_IMAGE_WIDTH: u32 = 50;
pub const MAX_IMAGE_WIDTH: u32 = 320;

const SEPARATOR: &str = "---";

/// Content anchoring for a slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SlideLayout {
    #[default]
    Center,
    Top,
    Bottom,
    Left,
    Right,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Alignment along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Start,
    Center,
    End,
}

impl SlideLayout {
    pub const ALL: [SlideLayout; 9] = [
        SlideLayout::Center,
        SlideLayout::Top,
        SlideLayout::Bottom,
        SlideLayout::Left,
        SlideLayout::Right,
        SlideLayout::TopLeft,
        SlideLayout::TopRight,
        SlideLayout::BottomLeft,
        SlideLayout::BottomRight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SlideLayout::Center => "center",
            SlideLayout::Top => "top",
            SlideLayout::Bottom => "bottom",
            SlideLayout::Left => "left",
            SlideLayout::Right => "right",
            SlideLayout::TopLeft => "top-left",
            SlideLayout::TopRight => "top-right",
            SlideLayout::BottomLeft => "bottom-left",
            SlideLayout::BottomRight => "bottom-right",
        }
    }

    pub fn vertical(&self) -> Align {
        match self {
            SlideLayout::Top | SlideLayout::TopLeft | SlideLayout::TopRight => Align::Start,
            SlideLayout::Bottom | SlideLayout::BottomLeft | SlideLayout::BottomRight => Align::End,
            SlideLayout::Center | SlideLayout::Left | SlideLayout::Right => Align::Center,
        }
    }

    pub fn horizontal(&self) -> Align {
        match self {
            SlideLayout::Left | SlideLayout::TopLeft | SlideLayout::BottomLeft => Align::Start,
            SlideLayout::Right | SlideLayout::TopRight | SlideLayout::BottomRight => Align::End,
            SlideLayout::Center | SlideLayout::Top | SlideLayout::Bottom => Align::Center,
        }
    }
}

impl fmt::Display for SlideLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown slide layout '{0}'")]
pub struct InvalidSlideLayout(pub String);

impl FromStr for SlideLayout {
    type Err = InvalidSlideLayout;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SlideLayout::ALL
            .into_iter()
            .find(|layout| layout.as_str() == s)
            .ok_or_else(|| InvalidSlideLayout(s.to_string()))
    }
}

/// One slide of a deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    pub id: String,
    /// Markdown body with the layout comment removed.
    pub content: String,
    pub layout: SlideLayout,
}

/// Split a markdown document into slides.
pub fn parse_deck(markdown: &str) -> Vec<Slide> {
    split_chunks(markdown)
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| parse_slide(index, chunk))
        .collect()
}

fn parse_slide(index: usize, chunk: &str) -> Slide {
    let (layout, content) = match find_layout_comment(chunk) {
        Some(comment) => {
            let layout = comment.name.parse().unwrap_or_else(|_| {
                tracing::debug!(layout = comment.name, "Unknown slide layout, using center");
                SlideLayout::Center
            });
            let mut content = String::with_capacity(chunk.len());
            content.push_str(&chunk[..comment.span.start]);
            content.push_str(&chunk[comment.span.end..]);
            (layout, content.trim().to_string())
        }
        None => (SlideLayout::Center, chunk.trim().to_string()),
    };

    Slide {
        id: format!("slide-{index}"),
        content,
        layout,
    }
}

/// Rewrite the layout of the slides at `indices`, leaving the others untouched.
///
/// Out-of-range indices are ignored. Returns the input unchanged when nothing
/// was selected.
pub fn set_layout(markdown: &str, indices: &[usize], layout: SlideLayout) -> String {
    let chunks = split_chunks(markdown);
    let mut changed = false;
    let rewritten: Vec<String> = chunks
        .iter()
        .enumerate()
        .map(|(index, chunk)| {
            if !indices.contains(&index) {
                return (*chunk).to_string();
            }
            changed = true;
            let trimmed = chunk.trim();
            let body = match find_layout_comment(trimmed) {
                Some(comment) => {
                    let mut end = comment.span.end;
                    if trimmed[end..].starts_with('\n') {
                        end += 1;
                    }
                    format!("{}{}", &trimmed[..comment.span.start], &trimmed[end..])
                }
                None => trimmed.to_string(),
            };
            format!("\n<!-- layout: {layout} -->\n\n{}\n", body.trim())
        })
        .collect();

    if changed {
        rewritten.join(SEPARATOR)
    } else {
        markdown.to_string()
    }
}

/// Set the width hint of every `![alt](src "N")` reference to `src`.
pub fn resize_image(markdown: &str, src: &str, width: u32) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut rest = markdown;

    while let Some(start) = rest.find("![") {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        match match_sized_image(candidate, src) {
            Some(image) => {
                out.push_str(&candidate[..image.width_digits.start]);
                out.push_str(&width.to_string());
                out.push_str(&candidate[image.width_digits.end..image.len]);
                rest = &candidate[image.len..];
            }
            None => {
                out.push_str("![");
                rest = &candidate[2..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Clamp a requested image width into the supported range.
pub fn clamp_image_width(width: u32) -> u32 {
    width.clamp(MIN_IMAGE_WIDTH, MAX_IMAGE_WIDTH)
}

/// Image reference found in slide markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub alt: String,
    pub src: String,
    /// Width hint from the title, when it is a number.
    pub width: Option<u32>,
}

/// Parse a whole-line `![alt](src "width")` image reference.
pub fn parse_image_line(line: &str) -> Option<ImageRef> {
    let line = line.trim();
    let rest = line.strip_prefix("![")?;
    let close_alt = rest.find(']')?;
    let alt = &rest[..close_alt];
    let target = rest[close_alt + 1..].strip_prefix('(')?.strip_suffix(')')?;

    let (src, title) = match target.find(char::is_whitespace) {
        Some(split) => (&target[..split], target[split..].trim()),
        None => (target, ""),
    };
    if src.is_empty() {
        return None;
    }

    let width = title
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .and_then(|t| t.parse::<u32>().ok());

    Some(ImageRef {
        alt: alt.to_string(),
        src: src.to_string(),
        width,
    })
}

/// Split on separator lines. Chunks keep their surrounding newlines so that
/// joining them with `---` restores the document.
fn split_chunks(markdown: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut chunk_start = 0;
    let mut line_start = 0;

    loop {
        let line_end = markdown[line_start..]
            .find('\n')
            .map(|i| line_start + i)
            .unwrap_or(markdown.len());
        let line = markdown[line_start..line_end].trim_end_matches('\r');
        if line == SEPARATOR {
            chunks.push(&markdown[chunk_start..line_start]);
            chunk_start = line_start + SEPARATOR.len();
        }
        if line_end >= markdown.len() {
            break;
        }
        line_start = line_end + 1;
    }
    chunks.push(&markdown[chunk_start..]);
    chunks
}

struct LayoutComment<'a> {
    span: Range<usize>,
    name: &'a str,
}

fn find_layout_comment(text: &str) -> Option<LayoutComment<'_>> {
    let mut search_from = 0;
    while let Some(found) = text[search_from..].find("<!--") {
        let start = search_from + found;
        if let Some(comment) = match_layout_comment(text, start) {
            return Some(comment);
        }
        search_from = start + 4;
    }
    None
}

fn match_layout_comment(text: &str, start: usize) -> Option<LayoutComment<'_>> {
    let mut pos = start + 4;
    pos = skip_whitespace(text, pos);
    pos += text[pos..].strip_prefix("layout:").map(|_| 7)?;
    pos = skip_whitespace(text, pos);

    let name_len = text[pos..]
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(text.len() - pos);
    if name_len == 0 {
        return None;
    }
    let name = &text[pos..pos + name_len];
    pos = skip_whitespace(text, pos + name_len);

    // `-` is a name character, so a name may have swallowed the closing dashes.
    let (name, end) = if text[pos..].starts_with("-->") {
        (name, pos + 3)
    } else if let Some(stripped) = name.strip_suffix("--") {
        if !stripped.is_empty() && text[pos..].starts_with('>') {
            (stripped, pos + 1)
        } else {
            return None;
        }
    } else {
        return None;
    };

    Some(LayoutComment {
        span: start..end,
        name,
    })
}

fn skip_whitespace(text: &str, pos: usize) -> usize {
    pos + text[pos..]
        .find(|c: char| !c.is_whitespace())
        .unwrap_or(text.len() - pos)
}

struct SizedImage {
    width_digits: Range<usize>,
    len: usize,
}

/// Match `![alt](SRC<ws>"digits")` at the start of `text`.
fn match_sized_image(text: &str, src: &str) -> Option<SizedImage> {
    let rest = text.strip_prefix("![")?;
    let close_alt = rest.find(']')?;
    let mut pos = 2 + close_alt + 1;
    pos += text[pos..].strip_prefix('(').map(|_| 1)?;
    pos += text[pos..].strip_prefix(src).map(|_| src.len())?;

    let after_src = skip_whitespace(text, pos);
    if after_src == pos {
        return None;
    }
    pos = after_src;
    pos += text[pos..].strip_prefix('"').map(|_| 1)?;

    let digits = text[pos..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len() - pos);
    if digits == 0 {
        return None;
    }
    let width_digits = pos..pos + digits;
    pos += digits;
    pos += text[pos..].strip_prefix("\")").map(|_| 2)?;

    Some(SizedImage {
        width_digits,
        len: pos,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECK: &str = "# Hello\n\nWorld\n---\n<!-- layout: top-left -->\n## Second\n---\n\n- a\n- b\n";

    #[test]
    fn test_parse_deck_splits_on_separator_lines() {
        let slides = parse_deck(DECK);
        assert_eq!(slides.len(), 3);
        assert_eq!(slides[0].id, "slide-0");
        assert_eq!(slides[0].content, "# Hello\n\nWorld");
        assert_eq!(slides[1].layout, SlideLayout::TopLeft);
        assert_eq!(slides[1].content, "## Second");
        assert_eq!(slides[2].layout, SlideLayout::Center);
        assert_eq!(slides[2].content, "- a\n- b");
    }

    #[test]
    fn test_separator_must_be_whole_line() {
        let slides = parse_deck("a --- b\n----\n --- \nc");
        assert_eq!(slides.len(), 1);
    }

    #[test]
    fn test_empty_document_is_one_empty_slide() {
        let slides = parse_deck("");
        assert_eq!(slides.len(), 1);
        assert_eq!(slides[0].content, "");
    }

    #[test]
    fn test_layout_comment_whitespace_tolerant() {
        let slides = parse_deck("<!--layout:bottom-right-->\ntext");
        assert_eq!(slides[0].layout, SlideLayout::BottomRight);
        assert_eq!(slides[0].content, "text");

        let slides = parse_deck("<!--   layout:   right   -->text");
        assert_eq!(slides[0].layout, SlideLayout::Right);
        assert_eq!(slides[0].content, "text");
    }

    #[test]
    fn test_unknown_layout_falls_back_to_center() {
        let slides = parse_deck("<!-- layout: diagonal -->\nx");
        assert_eq!(slides[0].layout, SlideLayout::Center);
        assert_eq!(slides[0].content, "x");
    }

    #[test]
    fn test_set_layout_rewrites_only_selected() {
        let out = set_layout(DECK, &[0, 1], SlideLayout::Bottom);
        let slides = parse_deck(&out);
        assert_eq!(slides.len(), 3);
        assert_eq!(slides[0].layout, SlideLayout::Bottom);
        assert_eq!(slides[0].content, "# Hello\n\nWorld");
        assert_eq!(slides[1].layout, SlideLayout::Bottom);
        assert_eq!(slides[1].content, "## Second");
        assert_eq!(slides[2].layout, SlideLayout::Center);
        assert!(out.ends_with("---\n\n- a\n- b\n"));
    }

    #[test]
    fn test_set_layout_ignores_out_of_range() {
        assert_eq!(set_layout(DECK, &[7], SlideLayout::Top), DECK);
    }

    #[test]
    fn test_resize_image() {
        let md = "![cat](local://img_1 \"280\")\n![dog](local://img_2 \"100\")\n![cat again](local://img_1  \"90\")";
        let out = resize_image(md, "local://img_1", 150);
        assert_eq!(
            out,
            "![cat](local://img_1 \"150\")\n![dog](local://img_2 \"100\")\n![cat again](local://img_1  \"150\")"
        );
    }

    #[test]
    fn test_resize_image_requires_numeric_title() {
        let md = "![x](a.png \"big\") ![y](a.png)";
        assert_eq!(resize_image(md, "a.png", 10), md);
    }

    #[test]
    fn test_parse_image_line() {
        let image = parse_image_line("  ![A cat](local://img_ab \"120\") ").unwrap();
        assert_eq!(image.alt, "A cat");
        assert_eq!(image.src, "local://img_ab");
        assert_eq!(image.width, Some(120));

        let image = parse_image_line("![](photo.png)").unwrap();
        assert_eq!(image.width, None);
        assert!(parse_image_line("text ![a](b)").is_none());
    }

    #[test]
    fn test_layout_alignment() {
        assert_eq!(SlideLayout::TopRight.vertical(), Align::Start);
        assert_eq!(SlideLayout::TopRight.horizontal(), Align::End);
        assert_eq!(SlideLayout::Bottom.horizontal(), Align::Center);
        assert_eq!(SlideLayout::Left.vertical(), Align::Center);
    }

    #[test]
    fn test_image_width_clamp() {
        assert_eq!(clamp_image_width(10), 50);
        assert_eq!(clamp_image_width(500), 320);
        assert_eq!(clamp_image_width(DEFAULT_IMAGE_WIDTH), 280);
    }
}
