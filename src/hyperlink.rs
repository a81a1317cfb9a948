//! Link sentinels embedded in paragraph text, the per-line hyperlink table and
//! resolution of link targets against the active document item.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

const SENTINEL_OPEN: char = '\u{1}';
const SENTINEL_CLOSE: char = '\u{2}';

static SENTINEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x01([^\x02]*)\x02").expect("valid sentinel regex"));

static ABSOLUTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*:|/)").expect("valid absolute-reference regex"));

/// Encodes a link target as a zero-width marker that survives word splitting.
///
/// Spaces and control characters are percent-encoded so the marker always
/// stays glued to the word that follows it.
pub fn sentinel(target: &str) -> String {
    let mut out = String::with_capacity(target.len() + 2);
    out.push(SENTINEL_OPEN);
    for c in target.chars() {
        match c {
            ' ' => out.push_str("%20"),
            c if c.is_control() => out.push_str(&format!("%{:02X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(SENTINEL_CLOSE);
    out
}

/// Strips every sentinel from `line`, returning the cleaned line and the
/// first sentinel's target (if any).
pub fn extract_link(line: &str) -> (String, Option<String>) {
    let target = SENTINEL_RE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());
    match target {
        Some(target) => (SENTINEL_RE.replace_all(line, "").into_owned(), Some(target)),
        None => (line.to_string(), None),
    }
}

/// The document part of a reference, without any `#fragment`.
pub fn document_part(target: &str) -> &str {
    target.split('#').next().unwrap_or(target)
}

/// Maps display line indices to the raw target reference found on them.
#[derive(Debug, Default, Clone)]
pub struct HyperlinkTable {
    links: HashMap<usize, String>,
}

impl HyperlinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `target` for `line`. Fragment-only targets are ignored.
    pub fn record(&mut self, line: usize, target: &str) {
        let target = document_part(target);
        if target.is_empty() {
            return;
        }
        self.links.insert(line, target.to_string());
    }

    pub fn get(&self, line: usize) -> Option<&str> {
        self.links.get(&line).map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.links.clear();
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Whether `reference` is absolute: a leading slash or a URI scheme.
pub fn is_absolute(reference: &str) -> bool {
    ABSOLUTE_RE.is_match(reference)
}

/// Resolves `reference` against the directory of `base` (the active item's
/// path) and collapses `./` and `segment/../` pairs.
pub fn resolve_reference(base: &str, reference: &str) -> String {
    if is_absolute(reference) {
        return reference.to_string();
    }
    let dir = match base.rfind('/') {
        Some(slash) => &base[..=slash],
        None => "",
    };
    normalize(&format!("{dir}{reference}"))
}

fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "." => {}
            ".." if segments.last().is_some_and(|last| *last != "..") => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }
    segments.join("/")
}
