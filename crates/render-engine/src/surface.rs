//! Slide surface: a themed slide laid out at logical resolution.
//!
//! Layout happens in 360×640 logical units. The result is SVG markup for the
//! vector parts plus boxes where raster images go, so the rasterizer can scale
//! both to any output size.

use std::fmt::Write as _;

use tokslides_project_model::slide::{clamp_image_width, Align, Slide, DEFAULT_IMAGE_WIDTH};
use tokslides_project_model::theme::{Background, Rgba, Theme};

use crate::frame::{BASE_HEIGHT, BASE_WIDTH};
use crate::markup::{parse_blocks, Block, ListMarker, Span, SpanStyle};

const PADDING_X: f32 = 24.0;
const CONTENT_TOP: f32 = 40.0;
const CONTENT_BOTTOM_MARGIN: f32 = 40.0;
const FOOTER_HEIGHT: f32 = 56.0;
const CONTENT_WIDTH: f32 = BASE_WIDTH - 2.0 * PADDING_X;
const QUOTE_INDENT: f32 = 16.0;
const CODE_PADDING: f32 = 12.0;
const CODE_SIZE: f32 = 14.0;
const CODE_LINE_HEIGHT: f32 = 1.5;
pub const IMAGE_CORNER_RADIUS: f32 = 12.0;

/// Everything needed to draw one slide.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideSurface {
    pub slide: Slide,
    pub theme: Theme,
    /// Zero-based position in the deck.
    pub index: usize,
    pub total: usize,
    pub show_footer: bool,
}

/// Where a raster image lands, in logical units.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBox {
    pub src: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone)]
pub struct SurfaceLayout {
    pub svg: String,
    pub images: Vec<ImageBox>,
}

impl SlideSurface {
    pub fn new(slide: Slide, theme: Theme, index: usize, total: usize, show_footer: bool) -> Self {
        Self {
            slide,
            theme,
            index,
            total,
            show_footer,
        }
    }

    /// Sources of every image block, in document order.
    pub fn image_sources(&self) -> Vec<String> {
        parse_blocks(&self.slide.content)
            .into_iter()
            .filter_map(|block| match block {
                Block::Image(image) => Some(image.src),
                _ => None,
            })
            .collect()
    }

    pub fn footer_label(&self) -> String {
        format!("{} / {}", self.index + 1, self.total.max(1))
    }

    /// Lay out the slide.
    ///
    /// `font_family` is the CSS family list used for text; `image_size`
    /// reports the natural size of an image source when it can be decoded.
    pub fn layout(
        &self,
        font_family: &str,
        image_size: impl Fn(&str) -> Option<(u32, u32)>,
    ) -> SurfaceLayout {
        let align_x = self.slide.layout.horizontal();
        let items: Vec<Item> = parse_blocks(&self.slide.content)
            .into_iter()
            .map(|block| self.measure(block, align_x, &image_size))
            .collect();

        let content_height: f32 = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let margin = if i + 1 < items.len() { item.margin_bottom } else { 0.0 };
                item.height + margin
            })
            .sum();

        let bottom = BASE_HEIGHT
            - CONTENT_BOTTOM_MARGIN
            - if self.show_footer { FOOTER_HEIGHT } else { 0.0 };
        let available = bottom - CONTENT_TOP;
        let top = match self.slide.layout.vertical() {
            Align::Start => CONTENT_TOP,
            Align::Center => CONTENT_TOP + ((available - content_height) / 2.0).max(0.0),
            Align::End => CONTENT_TOP + (available - content_height).max(0.0),
        };

        let mut svg = String::with_capacity(4096);
        let _ = write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{BASE_WIDTH}" height="{BASE_HEIGHT}" viewBox="0 0 {BASE_WIDTH} {BASE_HEIGHT}">"#
        );
        write_background(&mut svg, &self.theme.background);

        let mut images = Vec::new();
        let mut y = top;
        for item in &items {
            match &item.kind {
                ItemKind::Text(text) => self.write_text(&mut svg, text, y, align_x, font_family),
                ItemKind::Code(lines) => self.write_code(&mut svg, lines, y, item.height),
                ItemKind::Image { src, width } => {
                    let x = match align_x {
                        Align::Start => PADDING_X,
                        Align::Center => (BASE_WIDTH - width) / 2.0,
                        Align::End => BASE_WIDTH - PADDING_X - width,
                    };
                    images.push(ImageBox {
                        src: src.clone(),
                        x,
                        y,
                        width: *width,
                        height: item.height,
                    });
                }
            }
            y += item.height + item.margin_bottom;
        }

        if self.show_footer {
            self.write_footer(&mut svg, font_family);
        }
        svg.push_str("</svg>");

        SurfaceLayout { svg, images }
    }

    fn measure(
        &self,
        block: Block,
        align_x: Align,
        image_size: &impl Fn(&str) -> Option<(u32, u32)>,
    ) -> Item {
        let theme = &self.theme;
        let text = |spans: Vec<Span>, style: TextStyle, indent: f32, margin: f32| {
            let lines = wrap_spans(&spans, &style, CONTENT_WIDTH - indent);
            let height = lines.len() as f32 * style.line_box();
            Item {
                height,
                margin_bottom: margin,
                kind: ItemKind::Text(TextItem {
                    lines,
                    style,
                    indent,
                }),
            }
        };

        match block {
            Block::Heading { level, spans } => {
                let (size, margin) = match level {
                    1 => (36.0, 16.0),
                    2 => (28.0, 12.0),
                    _ => (22.0, 10.0),
                };
                text(
                    spans,
                    TextStyle::new(size, 1.15, theme.heading_color).bold(),
                    0.0,
                    margin,
                )
            }
            Block::Paragraph { spans } => {
                text(spans, TextStyle::new(18.0, 1.4, theme.text_color), 0.0, 12.0)
            }
            Block::ListItem { marker, spans } => {
                let label = match marker {
                    ListMarker::Bullet => "• ".to_string(),
                    ListMarker::Ordered(n) => format!("{n}. "),
                };
                let mut with_marker = vec![Span {
                    text: label,
                    style: SpanStyle::Bold,
                }];
                with_marker.extend(spans);
                let mut style = TextStyle::new(18.0, 1.4, theme.text_color);
                style.marker_color = Some(theme.accent_color);
                text(with_marker, style, 0.0, 6.0)
            }
            Block::Quote { mut spans } => {
                let mut style = TextStyle::new(18.0, 1.4, theme.text_color).italic();
                style.opacity = 0.8;
                if align_x == Align::Start {
                    style.quote_bar = Some(theme.accent_color);
                    text(spans, style, QUOTE_INDENT, 12.0)
                } else {
                    spans.insert(0, plain("“"));
                    spans.push(plain("”"));
                    text(spans, style, 0.0, 12.0)
                }
            }
            Block::Code { lines } => {
                let max_chars = ((CONTENT_WIDTH - 2.0 * CODE_PADDING) / (CODE_SIZE * MONO_ADVANCE))
                    .floor()
                    .max(1.0) as usize;
                let lines: Vec<String> = lines
                    .iter()
                    .flat_map(|line| hard_wrap(line, max_chars))
                    .collect();
                let height = 2.0 * CODE_PADDING
                    + lines.len().max(1) as f32 * CODE_SIZE * CODE_LINE_HEIGHT;
                Item {
                    height,
                    margin_bottom: 12.0,
                    kind: ItemKind::Code(lines),
                }
            }
            Block::Image(image) => {
                let width = (clamp_image_width(image.width.unwrap_or(DEFAULT_IMAGE_WIDTH)) as f32)
                    .min(CONTENT_WIDTH);
                let height = match image_size(&image.src) {
                    Some((w, h)) if w > 0 => width * h as f32 / w as f32,
                    _ => width * 0.75,
                };
                Item {
                    height,
                    margin_bottom: 12.0,
                    kind: ItemKind::Image {
                        src: image.src,
                        width,
                    },
                }
            }
        }
    }

    fn write_text(&self, svg: &mut String, item: &TextItem, top: f32, align_x: Align, family: &str) {
        let style = &item.style;
        let (x, anchor) = match align_x {
            Align::Start => (PADDING_X + item.indent, "start"),
            Align::Center => (BASE_WIDTH / 2.0, "middle"),
            Align::End => (BASE_WIDTH - PADDING_X, "end"),
        };

        if let Some(bar) = style.quote_bar {
            let _ = write!(
                svg,
                r#"<rect x="{PADDING_X}" y="{top:.2}" width="4" height="{:.2}" rx="2"{}/>"#,
                item.lines.len() as f32 * style.line_box(),
                paint("fill", bar, 1.0)
            );
        }

        for (i, line) in item.lines.iter().enumerate() {
            let baseline = top + i as f32 * style.line_box() + style.baseline_offset();
            let _ = write!(
                svg,
                r#"<text x="{x:.2}" y="{baseline:.2}" font-family="{}" font-size="{}" text-anchor="{anchor}" xml:space="preserve"{}{}{}>"#,
                escape(family),
                style.size,
                paint("fill", style.color, style.opacity),
                if style.bold { r#" font-weight="bold""# } else { "" },
                if style.italic { r#" font-style="italic""# } else { "" },
            );
            for (j, span) in line.iter().enumerate() {
                let is_marker = i == 0 && j == 0 && style.marker_color.is_some();
                svg.push_str("<tspan");
                match span.style {
                    SpanStyle::Plain => {}
                    SpanStyle::Bold => svg.push_str(r#" font-weight="bold""#),
                    SpanStyle::Italic => svg.push_str(r#" font-style="italic""#),
                    SpanStyle::Code => {
                        svg.push_str(r#" font-family="monospace""#);
                        svg.push_str(&paint("fill", self.theme.accent_color, 1.0));
                    }
                }
                if let (true, Some(color)) = (is_marker, style.marker_color) {
                    svg.push_str(&paint("fill", color, 1.0));
                }
                let _ = write!(svg, ">{}</tspan>", escape(&span.text));
            }
            svg.push_str("</text>");
        }
    }

    fn write_code(&self, svg: &mut String, lines: &[String], top: f32, height: f32) {
        let _ = write!(
            svg,
            r#"<rect x="{PADDING_X}" y="{top:.2}" width="{CONTENT_WIDTH}" height="{height:.2}" rx="8"{}/>"#,
            paint("fill", self.theme.code_bg, 1.0)
        );
        let line_box = CODE_SIZE * CODE_LINE_HEIGHT;
        for (i, line) in lines.iter().enumerate() {
            let baseline = top + CODE_PADDING + i as f32 * line_box + (line_box - CODE_SIZE) / 2.0
                + CODE_SIZE * 0.8;
            let _ = write!(
                svg,
                r#"<text x="{:.2}" y="{baseline:.2}" font-family="monospace" font-size="{CODE_SIZE}" xml:space="preserve"{}>{}</text>"#,
                PADDING_X + CODE_PADDING,
                paint("fill", self.theme.code_text, 1.0),
                escape(line)
            );
        }
    }

    fn write_footer(&self, svg: &mut String, family: &str) {
        let line_y = BASE_HEIGHT - FOOTER_HEIGHT + 8.0;
        let baseline = BASE_HEIGHT - 24.0;
        let color = self.theme.text_color;
        let _ = write!(
            svg,
            r#"<line x1="{PADDING_X}" y1="{line_y}" x2="{}" y2="{line_y}" stroke-width="1"{}/>"#,
            BASE_WIDTH - PADDING_X,
            paint("stroke", color, 0.1)
        );
        let _ = write!(
            svg,
            r#"<text x="{PADDING_X}" y="{baseline}" font-family="{}" font-size="12" font-weight="bold"{}>TokSlides</text>"#,
            escape(family),
            paint("fill", color, 0.6)
        );
        let _ = write!(
            svg,
            r#"<text x="{}" y="{baseline}" font-family="{}" font-size="12" text-anchor="end"{}>{}</text>"#,
            BASE_WIDTH - PADDING_X,
            escape(family),
            paint("fill", color, 0.6),
            escape(&self.footer_label())
        );
    }
}

struct Item {
    height: f32,
    margin_bottom: f32,
    kind: ItemKind,
}

enum ItemKind {
    Text(TextItem),
    Code(Vec<String>),
    Image { src: String, width: f32 },
}

struct TextItem {
    lines: Vec<Vec<Span>>,
    style: TextStyle,
    indent: f32,
}

#[derive(Debug, Clone)]
struct TextStyle {
    size: f32,
    line_height: f32,
    color: Rgba,
    opacity: f32,
    bold: bool,
    italic: bool,
    marker_color: Option<Rgba>,
    quote_bar: Option<Rgba>,
}

impl TextStyle {
    fn new(size: f32, line_height: f32, color: Rgba) -> Self {
        Self {
            size,
            line_height,
            color,
            opacity: 1.0,
            bold: false,
            italic: false,
            marker_color: None,
            quote_bar: None,
        }
    }

    fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    fn line_box(&self) -> f32 {
        self.size * self.line_height
    }

    fn baseline_offset(&self) -> f32 {
        (self.line_box() - self.size) / 2.0 + self.size * 0.8
    }

    fn advance(&self, span: SpanStyle) -> f32 {
        let em = match span {
            SpanStyle::Code => MONO_ADVANCE,
            SpanStyle::Bold => BOLD_ADVANCE,
            _ if self.bold => BOLD_ADVANCE,
            _ => REGULAR_ADVANCE,
        };
        em * self.size
    }
}

// Average glyph advances in em, used for wrapping without shaping.
const REGULAR_ADVANCE: f32 = 0.52;
const BOLD_ADVANCE: f32 = 0.56;
const MONO_ADVANCE: f32 = 0.6;

fn plain(text: &str) -> Span {
    Span {
        text: text.to_string(),
        style: SpanStyle::Plain,
    }
}

/// Greedy word wrap over styled spans.
fn wrap_spans(spans: &[Span], style: &TextStyle, max_width: f32) -> Vec<Vec<Span>> {
    let mut lines: Vec<Vec<Span>> = vec![Vec::new()];
    let mut width = 0.0f32;

    for span in spans {
        let advance = style.advance(span.style);
        for word in span.text.split_inclusive(' ') {
            let visible = word.trim_end_matches(' ').chars().count() as f32 * advance;
            if width > 0.0 && width + visible > max_width {
                trim_line_end(lines.last_mut());
                lines.push(Vec::new());
                width = 0.0;
            }

            let fit = (max_width / advance).floor().max(1.0) as usize;
            let mut pieces = hard_wrap(word, fit).into_iter().peekable();
            while let Some(piece) = pieces.next() {
                let piece_width = piece.chars().count() as f32 * advance;
                push_piece(lines.last_mut(), &piece, span.style);
                width += piece_width;
                if pieces.peek().is_some() {
                    lines.push(Vec::new());
                    width = 0.0;
                }
            }
        }
    }

    trim_line_end(lines.last_mut());
    lines.retain(|line| !line.is_empty());
    if lines.is_empty() {
        lines.push(Vec::new());
    }
    lines
}

fn push_piece(line: Option<&mut Vec<Span>>, text: &str, style: SpanStyle) {
    let Some(line) = line else { return };
    if line.is_empty() && text.trim().is_empty() {
        return;
    }
    match line.last_mut() {
        Some(last) if last.style == style => last.text.push_str(text),
        _ => line.push(Span {
            text: text.to_string(),
            style,
        }),
    }
}

fn trim_line_end(line: Option<&mut Vec<Span>>) {
    let Some(line) = line else { return };
    if let Some(last) = line.last_mut() {
        let trimmed = last.text.trim_end().len();
        last.text.truncate(trimmed);
        if last.text.is_empty() {
            line.pop();
        }
    }
}

/// Split text into chunks of at most `max_chars` characters.
fn hard_wrap(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return vec![text.to_string()];
    }
    chars
        .chunks(max_chars.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

fn write_background(svg: &mut String, background: &Background) {
    match background {
        Background::Solid { color } => {
            let _ = write!(
                svg,
                r#"<rect width="{BASE_WIDTH}" height="{BASE_HEIGHT}"{}/>"#,
                paint("fill", *color, 1.0)
            );
        }
        Background::Gradient { angle_deg, stops } => {
            let (x1, y1, x2, y2) = gradient_line(*angle_deg);
            let _ = write!(
                svg,
                r#"<defs><linearGradient id="bg" gradientUnits="userSpaceOnUse" x1="{x1:.2}" y1="{y1:.2}" x2="{x2:.2}" y2="{y2:.2}">"#
            );
            let last = stops.len().saturating_sub(1).max(1) as f32;
            for (i, stop) in stops.iter().enumerate() {
                let _ = write!(
                    svg,
                    r#"<stop offset="{:.4}" stop-color="{}" stop-opacity="{:.3}"/>"#,
                    i as f32 / last,
                    stop.hex_rgb(),
                    stop.opacity()
                );
            }
            let _ = write!(
                svg,
                r#"</linearGradient></defs><rect width="{BASE_WIDTH}" height="{BASE_HEIGHT}" fill="url(#bg)"/>"#
            );
        }
    }
}

/// Endpoints of a CSS `linear-gradient(<angle>)` line over the slide box.
fn gradient_line(angle_deg: f32) -> (f32, f32, f32, f32) {
    let theta = angle_deg.to_radians();
    let (dx, dy) = (theta.sin(), -theta.cos());
    let half = (BASE_WIDTH / 2.0 * dx).abs() + (BASE_HEIGHT / 2.0 * dy).abs();
    let (cx, cy) = (BASE_WIDTH / 2.0, BASE_HEIGHT / 2.0);
    (cx - dx * half, cy - dy * half, cx + dx * half, cy + dy * half)
}

fn paint(attr: &str, color: Rgba, opacity: f32) -> String {
    let alpha = color.opacity() * opacity;
    if alpha >= 1.0 {
        format!(r#" {attr}="{}""#, color.hex_rgb())
    } else {
        format!(r#" {attr}="{}" {attr}-opacity="{alpha:.3}""#, color.hex_rgb())
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
