//! Selector-based SVG mutation over the document source text.
//!
//! The rasterizer's parsed tree is immutable, so edits operate on the
//! retained SVG text with streaming `quick-xml` rewrite passes: query what
//! matches, rewrite attributes or text content, then reload the wrapper from
//! the new text. Selectors cover the CSS subset the edit dialogs prompt for:
//! `*`, `tag`, `#id`, `.class` and combinations, comma-separated.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesStart, BytesText, Event};

#[derive(Debug, thiserror::Error)]
pub enum DomError {
    #[error("malformed SVG document: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed SVG attribute: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("failed to serialize SVG document: {0}")]
    Io(#[from] std::io::Error),
    #[error("rewritten document is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("invalid selector: {0}")]
    InvalidSelector(String),
    #[error("no elements matched the selector")]
    NoMatch,
    #[error("no such text element")]
    NoTextElement,
    #[error("document has no <svg> root element")]
    MissingSvgRoot,
}

// ============================================================================
// SELECTOR — the CSS subset the edit dialogs accept
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SimpleSelector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

impl SimpleSelector {
    fn matches(&self, tag: &str, id: Option<&str>, class_attr: Option<&str>) -> bool {
        if let Some(want) = &self.tag {
            if want != tag {
                return false;
            }
        }
        if let Some(want) = &self.id {
            if id != Some(want.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let Some(classes) = class_attr else {
                return false;
            };
            let have: Vec<&str> = classes.split_whitespace().collect();
            if !self.classes.iter().all(|c| have.contains(&c.as_str())) {
                return false;
            }
        }
        true
    }
}

/// A parsed selector list, e.g. `rect, circle.accent, #logo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    parts: Vec<SimpleSelector>,
}

impl Selector {
    pub fn parse(text: &str) -> Result<Self, DomError> {
        let mut parts = Vec::new();
        for raw in text.split(',') {
            let simple = raw.trim();
            if simple.is_empty() {
                return Err(DomError::InvalidSelector(text.to_string()));
            }
            parts.push(parse_simple(simple, text)?);
        }
        Ok(Self { parts })
    }

    fn matches(&self, tag: &str, id: Option<&str>, class_attr: Option<&str>) -> bool {
        self.parts.iter().any(|p| p.matches(tag, id, class_attr))
    }
}

fn parse_simple(simple: &str, whole: &str) -> Result<SimpleSelector, DomError> {
    if simple == "*" {
        return Ok(SimpleSelector::default());
    }

    let invalid = || DomError::InvalidSelector(whole.to_string());
    let mut part = SimpleSelector::default();
    let mut rest = simple;

    // Optional leading tag name.
    let tag_len = rest.find(['#', '.']).unwrap_or(rest.len());
    if tag_len > 0 {
        let tag = &rest[..tag_len];
        if !is_ident(tag) {
            return Err(invalid());
        }
        part.tag = Some(tag.to_string());
        rest = &rest[tag_len..];
    }

    // Any number of #id / .class suffixes.
    while !rest.is_empty() {
        let marker = rest.as_bytes()[0];
        let tail = &rest[1..];
        let len = tail.find(['#', '.']).unwrap_or(tail.len());
        let ident = &tail[..len];
        if !is_ident(ident) {
            return Err(invalid());
        }
        match marker {
            b'#' => part.id = Some(ident.to_string()),
            b'.' => part.classes.push(ident.to_string()),
            _ => return Err(invalid()),
        }
        rest = &tail[len..];
    }
    Ok(part)
}

fn is_ident(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

// ============================================================================
// FILL MUTATION — rewrite matching elements' fill attribute
// ============================================================================

/// Set `fill="color"` on every element matching the selector, returning the
/// rewritten document text. Zero matches is an error and the input is not
/// considered modified.
pub fn set_fill(svg: &str, selector: &Selector, color: &str) -> Result<String, DomError> {
    let mut reader = Reader::from_str(svg);
    let mut writer = Writer::new(Vec::new());
    let mut matched = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if event_matches(selector, &e)? {
                    matched += 1;
                    writer.write_event(Event::Start(with_attribute(&e, "fill", color)?))?;
                } else {
                    writer.write_event(Event::Start(e))?;
                }
            }
            Event::Empty(e) => {
                if event_matches(selector, &e)? {
                    matched += 1;
                    writer.write_event(Event::Empty(with_attribute(&e, "fill", color)?))?;
                } else {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Event::Eof => break,
            ev => writer.write_event(ev)?,
        }
    }

    if matched == 0 {
        return Err(DomError::NoMatch);
    }
    Ok(String::from_utf8(writer.into_inner())?)
}

/// Bulk fallback for when the structured rewrite is unavailable: inject a
/// `<style>` override right after the root `<svg>` start tag.
pub fn override_fill_stylesheet(
    svg: &str,
    selector_text: &str,
    color: &str,
) -> Result<String, DomError> {
    let mut reader = Reader::from_str(svg);
    let mut writer = Writer::new(Vec::new());
    let mut injected = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let is_root = !injected && e.local_name().as_ref() == b"svg";
                writer.write_event(Event::Start(e))?;
                if is_root {
                    let css = format!("{selector_text} {{ fill: {color} !important; }}");
                    writer.write_event(Event::Start(BytesStart::new("style")))?;
                    writer.write_event(Event::Text(BytesText::new(&css)))?;
                    writer.write_event(Event::End(BytesStart::new("style").to_end()))?;
                    injected = true;
                }
            }
            Event::Eof => break,
            ev => writer.write_event(ev)?,
        }
    }

    if !injected {
        return Err(DomError::MissingSvgRoot);
    }
    Ok(String::from_utf8(writer.into_inner())?)
}

fn event_matches(selector: &Selector, e: &BytesStart) -> Result<bool, DomError> {
    let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let id = get_attribute(e, "id")?;
    let class = get_attribute(e, "class")?;
    Ok(selector.matches(&tag, id.as_deref(), class.as_deref()))
}

fn get_attribute(e: &BytesStart, name: &str) -> Result<Option<String>, DomError> {
    match e.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

/// Copy of a start tag with `name` replaced (or appended) as `name="value"`.
fn with_attribute(
    e: &BytesStart,
    name: &str,
    value: &str,
) -> Result<BytesStart<'static>, DomError> {
    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = BytesStart::new(tag);
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() != name.as_bytes() {
            out.push_attribute(attr);
        }
    }
    out.push_attribute((name, value));
    Ok(out)
}

// ============================================================================
// TEXT CONTENT — list and replace text-bearing elements
// ============================================================================

/// One text-bearing element: an element with a non-whitespace direct text
/// child. `ordinal` is the element's position in document order (counting
/// every element), which is what [`set_text`] addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEntry {
    pub ordinal: usize,
    pub tag: String,
    pub content: String,
}

impl TextEntry {
    /// Short display form for the selection list.
    pub fn preview(&self) -> String {
        const MAX: usize = 40;
        let trimmed = self.content.trim();
        if trimmed.chars().count() <= MAX {
            format!("<{}> \u{201c}{}\u{201d}", self.tag, trimmed)
        } else {
            let head: String = trimmed.chars().take(MAX).collect();
            format!("<{}> \u{201c}{}\u{2026}\u{201d}", self.tag, head)
        }
    }
}

/// All text-bearing elements of the document, in document order.
pub fn text_entries(svg: &str) -> Result<Vec<TextEntry>, DomError> {
    let mut reader = Reader::from_str(svg);
    let mut entries: Vec<TextEntry> = Vec::new();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut ordinal = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                ordinal += 1;
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                stack.push((ordinal, tag));
            }
            Event::Empty(_) => ordinal += 1,
            Event::End(_) => {
                stack.pop();
            }
            Event::Text(t) => {
                let content = t.unescape()?;
                if content.trim().is_empty() {
                    continue;
                }
                let Some((parent_ordinal, parent_tag)) = stack.last() else {
                    continue;
                };
                // First text child defines the entry; later siblings are
                // part of the same element and not listed twice.
                if entries.iter().any(|en| en.ordinal == *parent_ordinal) {
                    continue;
                }
                entries.push(TextEntry {
                    ordinal: *parent_ordinal,
                    tag: parent_tag.clone(),
                    content: content.trim().to_string(),
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(entries)
}

/// Replace the direct text content of the element at `ordinal` (document
/// order, counting every element) with `replacement`. Nested child elements
/// are preserved; their own text is untouched.
pub fn set_text(svg: &str, ordinal: usize, replacement: &str) -> Result<String, DomError> {
    let mut reader = Reader::from_str(svg);
    let mut writer = Writer::new(Vec::new());
    let mut current = 0usize;
    // Depth below the target element while inside it; None when outside.
    let mut inside: Option<usize> = None;
    let mut replaced = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                current += 1;
                if let Some(depth) = inside.as_mut() {
                    *depth += 1;
                    writer.write_event(Event::Start(e))?;
                } else if current == ordinal {
                    writer.write_event(Event::Start(e))?;
                    writer.write_event(Event::Text(BytesText::new(replacement)))?;
                    inside = Some(0);
                    replaced = true;
                } else {
                    writer.write_event(Event::Start(e))?;
                }
            }
            Event::Empty(e) => {
                current += 1;
                writer.write_event(Event::Empty(e))?;
            }
            Event::End(e) => {
                match inside.as_mut() {
                    Some(0) => inside = None,
                    Some(depth) => *depth -= 1,
                    None => {}
                }
                writer.write_event(Event::End(e))?;
            }
            // Direct text children of the target were replaced wholesale.
            Event::Text(_) if inside == Some(0) => {}
            Event::CData(_) if inside == Some(0) => {}
            Event::Eof => break,
            ev => writer.write_event(ev)?,
        }
    }

    if !replaced {
        return Err(DomError::NoTextElement);
    }
    Ok(String::from_utf8(writer.into_inner())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="64" height="64">
  <rect id="frame" class="outline thick" x="0" y="0" width="64" height="64" fill="#eeeeee"/>
  <circle class="accent" cx="32" cy="28" r="14"/>
  <text id="caption" x="32" y="58">hello <tspan>world</tspan></text>
</svg>"##;

    #[test]
    fn selector_grammar() {
        assert!(Selector::parse("*").is_ok());
        assert!(Selector::parse("rect, circle").is_ok());
        assert!(Selector::parse("#frame").is_ok());
        assert!(Selector::parse("circle.accent").is_ok());
        assert!(Selector::parse("rect#frame.outline.thick").is_ok());

        assert!(Selector::parse("").is_err());
        assert!(Selector::parse("rect,,circle").is_err());
        assert!(Selector::parse("rect >").is_err());
        assert!(Selector::parse("#").is_err());
    }

    #[test]
    fn selector_matching() {
        let sel = Selector::parse("circle.accent, #frame").unwrap();
        assert!(sel.matches("circle", None, Some("accent")));
        assert!(sel.matches("rect", Some("frame"), None));
        assert!(!sel.matches("circle", None, Some("other")));
        assert!(!sel.matches("path", None, None));

        let all = Selector::parse("*").unwrap();
        assert!(all.matches("anything", None, None));

        let multi = Selector::parse(".outline.thick").unwrap();
        assert!(multi.matches("rect", None, Some("thick outline")));
        assert!(!multi.matches("rect", None, Some("outline")));
    }

    #[test]
    fn set_fill_replaces_existing_attribute() {
        let sel = Selector::parse("#frame").unwrap();
        let out = set_fill(DOC, &sel, "#ff0000").unwrap();
        assert!(out.contains(r##"fill="#ff0000""##));
        assert!(!out.contains("#eeeeee"));
        // Untouched elements keep their shape.
        assert!(out.contains(r#"<circle class="accent" cx="32" cy="28" r="14""#));
    }

    #[test]
    fn set_fill_appends_when_missing() {
        let sel = Selector::parse("circle").unwrap();
        let out = set_fill(DOC, &sel, "green").unwrap();
        assert!(out.contains(r#"r="14" fill="green""#));
    }

    #[test]
    fn set_fill_star_touches_every_element() {
        let sel = Selector::parse("*").unwrap();
        let out = set_fill(DOC, &sel, "blue").unwrap();
        assert_eq!(out.matches(r#"fill="blue""#).count(), 5); // svg, rect, circle, text, tspan
    }

    #[test]
    fn set_fill_reports_no_match() {
        let sel = Selector::parse("polygon").unwrap();
        assert!(matches!(set_fill(DOC, &sel, "red"), Err(DomError::NoMatch)));
    }

    #[test]
    fn stylesheet_fallback_injects_after_root() {
        let out = override_fill_stylesheet(DOC, "*", "#00ff00").unwrap();
        let style_at = out.find("<style>").unwrap();
        let root_end = out.find("height=\"64\">").unwrap();
        assert!(style_at > root_end);
        assert!(out.contains("* { fill: #00ff00 !important; }"));
    }

    #[test]
    fn stylesheet_fallback_requires_svg_root() {
        let err = override_fill_stylesheet("<html><body/></html>", "*", "red");
        assert!(matches!(err, Err(DomError::MissingSvgRoot)));
    }

    #[test]
    fn text_entries_list_document_order() {
        let entries = text_entries(DOC).unwrap();
        // <text> bears "hello", its <tspan> child bears "world".
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].tag, "text");
        assert_eq!(entries[0].content, "hello");
        assert_eq!(entries[1].tag, "tspan");
        assert_eq!(entries[1].content, "world");
        assert!(entries[0].ordinal < entries[1].ordinal);
    }

    #[test]
    fn text_entry_preview_truncates() {
        let entry = TextEntry {
            ordinal: 1,
            tag: "text".into(),
            content: "x".repeat(60),
        };
        assert!(entry.preview().chars().count() < 50);
    }

    #[test]
    fn set_text_replaces_direct_content_only() {
        let entries = text_entries(DOC).unwrap();
        let out = set_text(DOC, entries[0].ordinal, "greetings").unwrap();
        assert!(out.contains(">greetings<"));
        assert!(!out.contains("hello"));
        // Nested tspan content survives.
        assert!(out.contains("<tspan>world</tspan>"));
    }

    #[test]
    fn set_text_on_nested_element() {
        let entries = text_entries(DOC).unwrap();
        let out = set_text(DOC, entries[1].ordinal, "planet").unwrap();
        assert!(out.contains("<tspan>planet</tspan>"));
        assert!(out.contains("hello"));
    }

    #[test]
    fn set_text_unknown_ordinal_fails() {
        assert!(matches!(
            set_text(DOC, 999, "nope"),
            Err(DomError::NoTextElement)
        ));
    }

    #[test]
    fn set_text_escapes_markup() {
        let entries = text_entries(DOC).unwrap();
        let out = set_text(DOC, entries[0].ordinal, "a < b & c").unwrap();
        assert!(out.contains("a &lt; b &amp; c"));
    }

    #[test]
    fn mutated_text_roundtrips_through_listing() {
        let entries = text_entries(DOC).unwrap();
        let out = set_text(DOC, entries[0].ordinal, "replaced").unwrap();
        let again = text_entries(&out).unwrap();
        assert_eq!(again[0].content, "replaced");
    }
}
