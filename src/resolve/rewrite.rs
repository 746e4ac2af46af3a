//! Rendering resolved references and failure placeholders.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use regex::Regex;

use super::scan::{HtmlAttribute, ReferenceSyntax, ResourceReference};

const BROKEN_IMAGE_SVG: &str = concat!(
    r##"<svg xmlns="http://www.w3.org/2000/svg" width="48" height="48" viewBox="0 0 48 48">"##,
    r##"<rect x="4" y="4" width="40" height="40" rx="4" fill="#f3f3f3" stroke="#b0b0b0" stroke-width="2"/>"##,
    r##"<path d="M12 34l8-10 6 7 4-5 6 8z" fill="#c8c8c8"/>"##,
    r##"<path d="M10 10l28 28M38 10L10 38" stroke="#d04040" stroke-width="3"/>"##,
    "</svg>"
);

// Reference syntax that must not survive into a placeholder.
static EMBEDDED_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"joplin-id:|:/[a-f0-9]{32}").expect("embedded reference pattern is valid")
});

/// Generic broken-image picture used as `src` of failed HTML tags.
pub static BROKEN_IMAGE_DATA_URI: LazyLock<String> =
    LazyLock::new(|| data_uri("image/svg+xml", BROKEN_IMAGE_SVG.as_bytes()));

pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

/// Replacement for a reference that resolved to `target` (data URI or path).
pub fn render_resolved(reference: &ResourceReference, target: &str) -> String {
    match reference.syntax {
        ReferenceSyntax::Markdown => format!("![{}]({target})", reference.alt),
        ReferenceSyntax::HtmlTag => render_tag(reference, target, &[]),
    }
}

/// Replacement for a reference that could not be resolved.
///
/// Never contains the original `:/<id>` or `joplin-id:<id>` reference.
pub fn render_placeholder(reference: &ResourceReference, reason: &str) -> String {
    let id = &reference.resource_id;
    match reference.syntax {
        ReferenceSyntax::Markdown => {
            let reason = placeholder_text(reason);
            let alt = placeholder_text(&reference.alt);
            let alt = alt.trim();
            if alt.is_empty() {
                format!("[Image unavailable: {id} ({reason})]")
            } else {
                format!("[Image unavailable: {alt}, {id} ({reason})]")
            }
        }
        ReferenceSyntax::HtmlTag => {
            let reason = placeholder_text(reason);
            let comment = format!("resource {id} could not be loaded: {reason}").replace("--", "-");
            let label = format!("Image unavailable ({reason})");
            let tag = render_tag(
                reference,
                &BROKEN_IMAGE_DATA_URI,
                &[("alt", label.as_str()), ("title", label.as_str())],
            );
            format!("<!-- {comment} -->{tag}")
        }
    }
}

/// Free text for a placeholder: no brackets, no reference syntax.
fn placeholder_text(text: &str) -> String {
    EMBEDDED_REFERENCE
        .replace_all(&text.replace(['[', ']'], ""), "")
        .into_owned()
}

/// Rebuild an `<img>` tag with `src` at its original position.
///
/// `overrides` replace existing attributes in place or are appended.
fn render_tag(reference: &ResourceReference, src: &str, overrides: &[(&str, &str)]) -> String {
    let mut out = String::from("<img");
    let mut applied = vec![false; overrides.len()];

    for (index, attr) in reference.attributes.iter().enumerate() {
        if index == reference.src_index {
            push_attr(&mut out, "src", src);
        }
        match overrides
            .iter()
            .position(|(name, _)| attr.name.eq_ignore_ascii_case(name))
        {
            Some(i) => {
                if !applied[i] {
                    push_attr(&mut out, &attr.name, overrides[i].1);
                    applied[i] = true;
                }
            }
            None => push_original(&mut out, attr),
        }
    }
    if reference.src_index >= reference.attributes.len() {
        push_attr(&mut out, "src", src);
    }
    for (i, (name, value)) in overrides.iter().enumerate() {
        if !applied[i] {
            push_attr(&mut out, name, value);
        }
    }

    out.push_str(if reference.self_closing { " />" } else { ">" });
    out
}

fn push_original(out: &mut String, attr: &HtmlAttribute) {
    match &attr.value {
        Some(value) => push_attr(out, &attr.name, value),
        None => push_attr(out, &attr.name, &attr.name),
    }
}

fn push_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&value.replace('"', "&quot;"));
    out.push('"');
}
