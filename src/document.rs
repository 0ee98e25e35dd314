//! Minimal live-document model.
//!
//! Only what the scanner needs: an ordered list of elements with a tag,
//! attributes and text content, plus the page host. Mutations (CMS filters,
//! page transitions) are modelled by appending, inserting or replacing
//! elements between scans.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub text: String,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    /// A `<script>` element with the given text content.
    pub fn script(text: impl Into<String>) -> Self {
        Self::new("script").text(text)
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn is_script(&self) -> bool {
        self.tag.eq_ignore_ascii_case("script")
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Host name the page is served from, e.g. `"site.webflow.io"`.
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl Document {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            elements: Vec::new(),
        }
    }

    /// Parse a JSON snapshot: `{"host": "...", "elements": [...]}`.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn push(&mut self, element: Element) -> usize {
        self.elements.push(element);
        self.elements.len() - 1
    }

    /// Insert before `index`, clamped to the end of the document.
    pub fn insert(&mut self, index: usize, element: Element) -> usize {
        let index = index.min(self.elements.len());
        self.elements.insert(index, element);
        index
    }

    /// Swap out a region of the document, as a CMS filter or page transition
    /// does. Returns the removed elements.
    pub fn replace_range(
        &mut self,
        range: std::ops::Range<usize>,
        elements: impl IntoIterator<Item = Element>,
    ) -> Vec<Element> {
        let end = range.end.min(self.elements.len());
        let start = range.start.min(end);
        self.elements.splice(start..end, elements).collect()
    }

    pub fn get(&self, index: usize) -> Option<&Element> {
        self.elements.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Element> {
        self.elements.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Indices of all script elements, in document order.
    pub fn script_indices(&self) -> Vec<usize> {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, el)| el.is_script())
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_snapshot() {
        let doc = Document::from_json(
            r#"{
                "host": "demo.webflow.io",
                "elements": [
                    {"tag": "div", "text": "hello"},
                    {"tag": "script", "attributes": {"data-lifecycle-skip": ""}, "text": "intro"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(doc.host, "demo.webflow.io");
        assert_eq!(doc.script_indices(), vec![1]);
        assert!(doc.get(1).unwrap().has_attribute("data-lifecycle-skip"));
    }

    #[test]
    fn replace_range_clamps() {
        let mut doc = Document::new("example.com");
        doc.push(Element::new("div"));
        doc.push(Element::script("a"));
        let removed = doc.replace_range(1..10, [Element::script("b"), Element::script("c")]);
        assert_eq!(removed.len(), 1);
        assert_eq!(doc.len(), 3);
        assert_eq!(doc.get(2).unwrap().text, "c");
    }

    #[test]
    fn malformed_snapshot_is_an_error() {
        assert!(Document::from_json("{\"elements\": 3}").is_err());
    }
}
