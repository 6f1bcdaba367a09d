//! Rich text blocks and their plain-text / HTML renderings

use html_escape::{encode_double_quoted_attribute, encode_text};
use serde::{Deserialize, Serialize};

/// Kind of a rich-text block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockKind {
    #[default]
    Paragraph,
    Heading1,
    Heading2,
    Heading3,
    Heading4,
    Heading5,
    Heading6,
    Preformatted,
    ListItem,
    OListItem,
    Image,
    Embed,
    #[serde(other)]
    Other,
}

/// A single rich-text block as delivered by the content API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RichTextBlock {
    #[serde(rename = "type", default)]
    pub kind: BlockKind,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub spans: Vec<Span>,
    /// Image source for `image` blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oembed: Option<Embed>,
}

impl RichTextBlock {
    /// Create a paragraph block with plain text
    pub fn paragraph(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Default::default()
        }
    }
}

/// Inline formatting over a range of a block's text.
///
/// `start` and `end` are UTF-16 code unit offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    #[serde(rename = "type")]
    pub kind: SpanKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpanKind {
    Strong,
    Em,
    Hyperlink,
    Label,
    #[serde(other)]
    Other,
}

/// oEmbed payload of an `embed` block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub embed_url: Option<String>,
}

/// Flatten blocks to plain text, joining non-empty block texts with a space
pub fn as_text(blocks: &[RichTextBlock]) -> String {
    blocks
        .iter()
        .filter_map(|block| block.text.as_deref())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render blocks to HTML
pub fn as_html(blocks: &[RichTextBlock]) -> String {
    let mut html = String::new();
    let mut open_list: Option<&'static str> = None;

    for block in blocks {
        let list_tag = match block.kind {
            BlockKind::ListItem => Some("ul"),
            BlockKind::OListItem => Some("ol"),
            _ => None,
        };

        if open_list != list_tag {
            if let Some(tag) = open_list {
                html.push_str(&format!("</{}>", tag));
            }
            if let Some(tag) = list_tag {
                html.push_str(&format!("<{}>", tag));
            }
            open_list = list_tag;
        }

        let inner = render_spans(block.text.as_deref().unwrap_or(""), &block.spans);
        match block.kind {
            BlockKind::Paragraph | BlockKind::Other => {
                html.push_str(&format!("<p>{}</p>", inner));
            }
            BlockKind::Heading1 => html.push_str(&format!("<h1>{}</h1>", inner)),
            BlockKind::Heading2 => html.push_str(&format!("<h2>{}</h2>", inner)),
            BlockKind::Heading3 => html.push_str(&format!("<h3>{}</h3>", inner)),
            BlockKind::Heading4 => html.push_str(&format!("<h4>{}</h4>", inner)),
            BlockKind::Heading5 => html.push_str(&format!("<h5>{}</h5>", inner)),
            BlockKind::Heading6 => html.push_str(&format!("<h6>{}</h6>", inner)),
            BlockKind::Preformatted => html.push_str(&format!("<pre>{}</pre>", inner)),
            BlockKind::ListItem | BlockKind::OListItem => {
                html.push_str(&format!("<li>{}</li>", inner));
            }
            BlockKind::Image => {
                let src = block.url.as_deref().unwrap_or("");
                let alt = block.alt.as_deref().unwrap_or("");
                html.push_str(&format!(
                    r#"<p class="block-img"><img src="{}" alt="{}"></p>"#,
                    encode_double_quoted_attribute(src),
                    encode_double_quoted_attribute(alt)
                ));
            }
            BlockKind::Embed => {
                // oEmbed markup comes from the repository and is trusted
                if let Some(embed) = &block.oembed {
                    html.push_str(&format!(
                        r#"<div data-oembed="{}">{}</div>"#,
                        encode_double_quoted_attribute(embed.embed_url.as_deref().unwrap_or("")),
                        embed.html.as_deref().unwrap_or("")
                    ));
                }
            }
        }
    }

    if let Some(tag) = open_list {
        html.push_str(&format!("</{}>", tag));
    }

    html
}

/// Apply inline spans to `text`, escaping it.
///
/// The text is cut at every span boundary and each segment is wrapped in all
/// spans covering it, so overlapping spans still produce well-formed markup.
fn render_spans(text: &str, spans: &[Span]) -> String {
    if spans.is_empty() {
        return encode_text(text).into_owned();
    }

    let offsets = utf16_byte_offsets(text);
    let to_byte = |pos: usize| offsets[pos.min(offsets.len() - 1)];

    let ranges: Vec<(usize, usize, &Span)> = spans
        .iter()
        .map(|span| (to_byte(span.start), to_byte(span.end), span))
        .filter(|(start, end, _)| start < end)
        .collect();

    let mut bounds: Vec<usize> = vec![0, text.len()];
    for (start, end, _) in &ranges {
        bounds.push(*start);
        bounds.push(*end);
    }
    bounds.sort_unstable();
    bounds.dedup();

    let mut html = String::new();
    for window in bounds.windows(2) {
        let (from, to) = (window[0], window[1]);
        let mut active: Vec<&(usize, usize, &Span)> = ranges
            .iter()
            .filter(|(start, end, _)| *start <= from && *end >= to)
            .collect();
        // Outermost (earliest start, latest end) first
        active.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        let mut segment = encode_text(&text[from..to]).into_owned();
        for (_, _, span) in active.iter().rev() {
            segment = wrap_span(span, &segment);
        }
        html.push_str(&segment);
    }

    html
}

fn wrap_span(span: &Span, inner: &str) -> String {
    match span.kind {
        SpanKind::Strong => format!("<strong>{}</strong>", inner),
        SpanKind::Em => format!("<em>{}</em>", inner),
        SpanKind::Hyperlink => {
            let url = span
                .data
                .as_ref()
                .and_then(|d| d.get("url"))
                .and_then(|u| u.as_str())
                .unwrap_or("#");
            format!(
                r#"<a href="{}">{}</a>"#,
                encode_double_quoted_attribute(url),
                inner
            )
        }
        SpanKind::Label => {
            let label = span
                .data
                .as_ref()
                .and_then(|d| d.get("label"))
                .and_then(|l| l.as_str())
                .unwrap_or("");
            format!(
                r#"<span class="{}">{}</span>"#,
                encode_double_quoted_attribute(label),
                inner
            )
        }
        SpanKind::Other => inner.to_string(),
    }
}

/// Byte offset for every UTF-16 position in `text`, plus one for the end
fn utf16_byte_offsets(text: &str) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(text.len() + 1);
    for (byte_idx, ch) in text.char_indices() {
        for _ in 0..ch.len_utf16() {
            offsets.push(byte_idx);
        }
    }
    offsets.push(text.len());
    offsets
}
