//! Dependency markers embedded in rendered output
//!
//! Every completed component appends `<!-- _RENDERED <nonce> <class_id> -->`
//! and the dependency tags emit `<!-- _DEPS_CSS <nonce> -->` /
//! `<!-- _DEPS_JS <nonce> -->`. The nonce is random per engine, so content
//! that merely looks like a marker is never treated as one.

use std::ops::Range;

use memchr::memmem;

use crate::parser::DepsKind;

const PREFIX: &[u8] = b"<!-- _";
const SUFFIX: &[u8] = b" -->";

/// A marker found in rendered output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker<'h> {
    pub range: Range<usize>,
    pub kind: MarkerKind<'h>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind<'h> {
    /// A rendered instance of the class with this id
    Rendered(&'h str),
    /// Insertion point for collected dependencies
    Placeholder(DepsKind),
}

/// Writes and recognises markers for one nonce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerFormat {
    nonce: String,
}

impl MarkerFormat {
    /// The nonce must be non-empty ASCII alphanumerics
    pub fn new(nonce: impl Into<String>) -> Self {
        Self {
            nonce: nonce.into(),
        }
    }

    /// Format with a random UUID v4 nonce
    pub fn random() -> Self {
        Self::new(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn rendered(&self, class_id: &str) -> String {
        format!("<!-- _RENDERED {} {} -->", self.nonce, class_id)
    }

    pub fn placeholder(&self, kind: DepsKind) -> String {
        let name = match kind {
            DepsKind::Css => "DEPS_CSS",
            DepsKind::Js => "DEPS_JS",
        };
        format!("<!-- _{} {} -->", name, self.nonce)
    }

    /// All markers in `html`, in document order
    pub fn scan<'h>(&self, html: &'h str) -> Vec<Marker<'h>> {
        let bytes = html.as_bytes();
        memmem::find_iter(bytes, PREFIX)
            .filter_map(|start| {
                let (len, kind) = self.match_at(html, start + PREFIX.len())?;
                Some(Marker {
                    range: start..start + PREFIX.len() + len,
                    kind,
                })
            })
            .collect()
    }

    /// Remove rendered-instance markers, returning the cleaned text and the markers
    pub fn strip_rendered<'h>(&self, html: &'h str) -> (String, Vec<&'h str>) {
        let mut out = String::with_capacity(html.len());
        let mut removed = Vec::new();
        let mut last = 0;
        for marker in self.scan(html) {
            if let MarkerKind::Rendered(_) = marker.kind {
                out.push_str(&html[last..marker.range.start]);
                removed.push(&html[marker.range.clone()]);
                last = marker.range.end;
            }
        }
        out.push_str(&html[last..]);
        (out, removed)
    }

    /// Match the marker body after the prefix; returns its length and kind
    fn match_at<'h>(&self, html: &'h str, pos: usize) -> Option<(usize, MarkerKind<'h>)> {
        let rest = &html.as_bytes()[pos..];
        if let Some(after) = rest.strip_prefix(b"RENDERED ") {
            let after = after.strip_prefix(self.nonce.as_bytes())?.strip_prefix(b" ")?;
            let id_len = after
                .iter()
                .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
                .count();
            if id_len == 0 || !after[id_len..].starts_with(SUFFIX) {
                return None;
            }
            let id_start = pos + (rest.len() - after.len());
            let id = &html[id_start..id_start + id_len];
            let len = id_start + id_len + SUFFIX.len() - pos;
            return Some((len, MarkerKind::Rendered(id)));
        }

        for (name, kind) in [(&b"DEPS_CSS "[..], DepsKind::Css), (&b"DEPS_JS "[..], DepsKind::Js)] {
            if let Some(after) = rest.strip_prefix(name) {
                let after = after.strip_prefix(self.nonce.as_bytes())?;
                if !after.starts_with(SUFFIX) {
                    return None;
                }
                let len = name.len() + self.nonce.len() + SUFFIX.len();
                return Some((len, MarkerKind::Placeholder(kind)));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn format() -> MarkerFormat {
        MarkerFormat::new("abc123")
    }

    #[test]
    fn test_scan_finds_markers_in_order() {
        let markers = format();
        let html = format!(
            "<p>{}</p>{}{}",
            markers.rendered("Card_a1b2c3"),
            markers.placeholder(DepsKind::Css),
            markers.rendered("Page_000000"),
        );
        let found: Vec<_> = markers.scan(&html).into_iter().map(|m| m.kind).collect();
        assert_eq!(
            found,
            vec![
                MarkerKind::Rendered("Card_a1b2c3"),
                MarkerKind::Placeholder(DepsKind::Css),
                MarkerKind::Rendered("Page_000000"),
            ]
        );
    }

    #[test]
    fn test_ranges_cover_whole_marker() {
        let markers = format();
        let marker = markers.rendered("Card_a1b2c3");
        let html = format!("x{}y", marker);
        let found = markers.scan(&html);
        assert_eq!(found[0].range, 1..1 + marker.len());
        let placeholder = markers.placeholder(DepsKind::Js);
        let found = markers.scan(&placeholder);
        assert_eq!(found[0].range, 0..placeholder.len());
    }

    #[test]
    fn test_lookalikes_are_ignored() {
        let markers = format();
        let html = concat!(
            "<!-- _RENDERED wrong Card_a1b2c3 -->",
            "<!-- _RENDERED abc123 bad-id -->",
            "<!-- _RENDERED abc123 Card -- >",
            "<!-- _DEPS_CSS abc1234 -->",
            "<!-- _OTHER abc123 -->",
        );
        assert!(markers.scan(html).is_empty());
    }

    #[test]
    fn test_strip_rendered_keeps_placeholders() {
        let markers = format();
        let html = format!(
            "a{}b{}",
            markers.rendered("X_1"),
            markers.placeholder(DepsKind::Js)
        );
        let (clean, removed) = markers.strip_rendered(&html);
        assert_eq!(clean, format!("ab{}", markers.placeholder(DepsKind::Js)));
        assert_eq!(removed, vec![markers.rendered("X_1").as_str()]);
    }

    #[test]
    fn test_random_nonce_is_hex() {
        let markers = MarkerFormat::random();
        assert_eq!(markers.nonce().len(), 32);
        assert!(markers.nonce().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
