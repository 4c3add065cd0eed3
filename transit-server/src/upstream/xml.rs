//! Namespace-agnostic XML helpers.
//!
//! The OJP, SIRI and DATEX II payloads each use their own namespaces (and
//! prefixes vary between deployments), so lookups match on local names only.

use chrono::{DateTime, Utc};
use roxmltree::{Document, Node};

use super::error::UpstreamError;

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

pub(crate) fn parse(text: &str) -> Result<Document<'_>, UpstreamError> {
    Ok(Document::parse(text)?)
}

/// Whether `node` is an element with local name `name`.
pub(crate) fn is(node: Node<'_, '_>, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}

/// First direct child element named `name`.
pub(crate) fn child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|n| is(*n, name))
}

/// Direct child elements named `name`, in document order.
pub(crate) fn children<'a, 'i>(
    node: Node<'a, 'i>,
    name: &str,
) -> impl Iterator<Item = Node<'a, 'i>> {
    node.children().filter(move |n| is(*n, name))
}

/// First element named `name` at any depth (including `node` itself).
pub(crate) fn descendant<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.descendants().find(|n| is(*n, name))
}

/// Elements named `name` at any depth, in document order.
pub(crate) fn descendants<'a, 'i>(
    node: Node<'a, 'i>,
    name: &str,
) -> impl Iterator<Item = Node<'a, 'i>> {
    node.descendants().filter(move |n| is(*n, name))
}

/// Trimmed text content; blank text is `None`.
pub(crate) fn text<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    node.text().map(str::trim).filter(|s| !s.is_empty())
}

pub(crate) fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    child(node, name).and_then(text)
}

/// Follow a chain of direct children.
pub(crate) fn path<'a, 'i>(node: Node<'a, 'i>, names: &[&str]) -> Option<Node<'a, 'i>> {
    names.iter().try_fold(node, |n, name| child(n, name))
}

pub(crate) fn path_text<'a>(node: Node<'a, '_>, names: &[&str]) -> Option<&'a str> {
    path(node, names).and_then(text)
}

/// Text of the first non-blank element named `name` at any depth.
pub(crate) fn descendant_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    descendants(node, name).find_map(text)
}

/// Text of elements named `name`, preferring the one tagged with `lang`
/// (via `xml:lang` or a plain `lang` attribute), else the first one.
pub(crate) fn localized_text<'a>(node: Node<'a, '_>, name: &str, lang: &str) -> Option<&'a str> {
    let mut first = None;
    for n in descendants(node, name) {
        let Some(t) = text(n) else { continue };
        let tag = n.attribute((XML_NS, "lang")).or_else(|| n.attribute("lang"));
        if tag.is_some_and(|l| l.eq_ignore_ascii_case(lang)) {
            return Some(t);
        }
        first.get_or_insert(t);
    }
    first
}

/// Parse an RFC 3339 timestamp to UTC.
pub(crate) fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn parse_f64(value: &str) -> Option<f64> {
    value.trim().parse().ok()
}

/// Escape text for inclusion in an XML element or attribute.
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const DOC: &str = r#"<a:Root xmlns:a="urn:a" xmlns:b="urn:b">
        <b:Item><b:Name> first </b:Name></b:Item>
        <a:Item><a:Name>second</a:Name></a:Item>
        <a:Summary xml:lang="de">Störung</a:Summary>
        <a:Summary xml:lang="EN">Disruption</a:Summary>
        <a:Empty>   </a:Empty>
    </a:Root>"#;

    #[test]
    fn lookups_ignore_namespaces() {
        let doc = parse(DOC).unwrap();
        let root = doc.root_element();
        assert!(is(root, "Root"));
        assert_eq!(children(root, "Item").count(), 2);
        assert_eq!(path_text(root, &["Item", "Name"]), Some("first"));
        assert_eq!(descendants(root, "Name").count(), 2);
        assert_eq!(child_text(root, "Empty"), None);
        assert_eq!(descendant_text(root, "Missing"), None);
    }

    #[test]
    fn localized_text_prefers_language() {
        let doc = parse(DOC).unwrap();
        let root = doc.root_element();
        assert_eq!(localized_text(root, "Summary", "en"), Some("Disruption"));
        assert_eq!(localized_text(root, "Summary", "fr"), Some("Störung"));
        assert_eq!(localized_text(root, "Nothing", "en"), None);
    }

    #[test]
    fn datetimes_normalise_to_utc() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap();
        assert_eq!(parse_datetime("2024-03-15T10:00:00+01:00"), Some(expected));
        assert_eq!(parse_datetime(" 2024-03-15T09:00:00Z "), Some(expected));
        assert_eq!(parse_datetime("yesterday"), None);
    }

    #[test]
    fn escaping() {
        assert_eq!(escape("Zürich <HB> & \"Bern\""), "Zürich &lt;HB&gt; &amp; &quot;Bern&quot;");
    }

    #[test]
    fn malformed_documents_are_errors() {
        assert!(parse("<open>").is_err());
    }
}
