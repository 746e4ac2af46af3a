//! Scanning note bodies for embedded resource references.
//!
//! Two syntaxes are recognised:
//!
//! - markdown images: `![alt](:/<id>)`
//! - HTML image tags whose `src` is exactly `joplin-id:<id>`
//!
//! `<id>` must be 32 lowercase hex characters. Anything else (uppercase hex,
//! wrong length, other schemes) is not a reference and stays literal text.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// `src` scheme used by HTML image tags.
pub const HTML_SRC_PREFIX: &str = "joplin-id:";

/// Length of a resource id.
pub const RESOURCE_ID_LEN: usize = 32;

static MARKDOWN_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[([^\]]*)\]\(:/([a-f0-9]{32})\)").expect("markdown image pattern is valid")
});

// Quoted attribute values may contain '>'.
static HTML_IMG_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img\b(?:[^>"']|"[^"]*"|'[^']*')*>"#).expect("img tag pattern is valid")
});

static HTML_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^\s"'<>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("attribute pattern is valid")
});

/// Whether `id` is exactly 32 lowercase hex characters.
pub fn is_resource_id(id: &str) -> bool {
    id.len() == RESOURCE_ID_LEN && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSyntax {
    Markdown,
    HtmlTag,
}

/// One HTML attribute as written. `value` is `None` for valueless attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlAttribute {
    pub name: String,
    pub value: Option<String>,
}

/// A resource reference found in a note body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReference {
    pub syntax: ReferenceSyntax,
    pub resource_id: String,
    /// Exact matched text.
    pub raw: String,
    /// Byte range of `raw` within the body.
    pub span: Range<usize>,
    /// Markdown alt text (empty for HTML tags).
    pub alt: String,
    /// HTML attributes other than `src`, in source order.
    pub attributes: Vec<HtmlAttribute>,
    /// Position `src` occupied among the attributes.
    pub src_index: usize,
    /// Whether the tag was written `<img ... />`.
    pub self_closing: bool,
}

/// Find every resource reference in `body`, ordered by position.
///
/// Overlapping matches keep the one that starts first.
pub fn scan(body: &str) -> Vec<ResourceReference> {
    let mut references: Vec<ResourceReference> = MARKDOWN_IMAGE
        .captures_iter(body)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(ResourceReference {
                syntax: ReferenceSyntax::Markdown,
                resource_id: caps[2].to_string(),
                raw: whole.as_str().to_string(),
                span: whole.range(),
                alt: caps[1].to_string(),
                attributes: Vec::new(),
                src_index: 0,
                self_closing: false,
            })
        })
        .collect();

    references.extend(
        HTML_IMG_TAG
            .find_iter(body)
            .filter_map(|m| parse_img_tag(m.as_str(), m.range())),
    );

    references.sort_by_key(|r| r.span.start);

    let mut end = 0;
    references.retain(|r| {
        if r.span.start < end {
            return false;
        }
        end = r.span.end;
        true
    });
    references
}

/// Distinct resource ids in first-seen order.
pub fn unique_ids(references: &[ResourceReference]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for reference in references {
        if !ids.contains(&reference.resource_id) {
            ids.push(reference.resource_id.clone());
        }
    }
    ids
}

fn parse_img_tag(tag: &str, span: Range<usize>) -> Option<ResourceReference> {
    // Strip "<img" and the closing ">" (plus "/" for self-closing tags).
    let inner = &tag[4..tag.len() - 1];
    let trimmed = inner.trim_end();
    let self_closing = trimmed.ends_with('/');
    let inner = if self_closing {
        &trimmed[..trimmed.len() - 1]
    } else {
        inner
    };

    let mut attributes = Vec::new();
    let mut resource_id = None;
    let mut src_index = 0;

    for caps in HTML_ATTRIBUTE.captures_iter(inner) {
        let name = caps[1].to_string();
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str().to_string());

        if resource_id.is_none() && name.eq_ignore_ascii_case("src") {
            let id = value.as_deref()?.strip_prefix(HTML_SRC_PREFIX)?;
            if !is_resource_id(id) {
                return None;
            }
            resource_id = Some(id.to_string());
            src_index = attributes.len();
            continue;
        }
        attributes.push(HtmlAttribute { name, value });
    }

    Some(ResourceReference {
        syntax: ReferenceSyntax::HtmlTag,
        resource_id: resource_id?,
        raw: tag.to_string(),
        span,
        alt: String::new(),
        attributes,
        src_index,
        self_closing,
    })
}
