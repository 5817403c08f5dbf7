//! XML document handling
//!
//! A small element tree built with `quick-xml`. It serves both as the input
//! representation of schema documents and as the instance documents handed to
//! [`ComponentModel::validate_document`](crate::model::ComponentModel::validate_document).
//! Child order and interleaved character data are preserved, and every element
//! carries its full in-scope namespace context so QName-valued attributes can be
//! resolved later.

use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::locations::Location;
use crate::namespaces::{NamespaceContext, QName};
use indexmap::IndexMap;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// A child node: element or character data
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Child element
    Element(Element),
    /// Character data (text or CDATA)
    Text(String),
}

/// XML Element in the document tree
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Element qualified name
    pub qname: QName,
    /// Element attributes, in document order (namespace declarations excluded)
    pub attributes: IndexMap<QName, String>,
    /// Children in document order
    pub nodes: Vec<Node>,
    /// In-scope namespace context
    pub namespaces: NamespaceContext,
    /// Byte offset of the start tag
    pub position: usize,
}

impl Element {
    /// Create a new element
    pub fn new(qname: QName) -> Self {
        Self {
            qname,
            attributes: IndexMap::new(),
            nodes: Vec::new(),
            namespaces: NamespaceContext::new(),
            position: 0,
        }
    }

    /// Get the local name of the element
    pub fn local_name(&self) -> &str {
        &self.qname.local_name
    }

    /// Get the namespace of the element
    pub fn namespace(&self) -> Option<&str> {
        self.qname.namespace.as_deref()
    }

    /// Get an unqualified attribute value by local name
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(qname, _)| qname.namespace.is_none() && qname.local_name == name)
            .map(|(_, value)| value.as_str())
    }

    /// Get an attribute value by qualified name
    pub fn get_attribute_qname(&self, qname: &QName) -> Option<&str> {
        self.attributes.get(qname).map(|s| s.as_str())
    }

    /// Add a child element
    pub fn add_child(&mut self, child: Element) {
        self.nodes.push(Node::Element(child));
    }

    /// Append character data, merging with a preceding text node
    pub fn add_text(&mut self, text: &str) {
        if let Some(Node::Text(last)) = self.nodes.last_mut() {
            last.push_str(text);
        } else {
            self.nodes.push(Node::Text(text.to_string()));
        }
    }

    /// Child elements in document order
    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Concatenated character data of this element (not descendants)
    pub fn text(&self) -> String {
        self.nodes
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Whether the element has non-whitespace character data
    pub fn has_text(&self) -> bool {
        self.nodes.iter().any(|node| match node {
            Node::Text(t) => !t.trim().is_empty(),
            Node::Element(_) => false,
        })
    }

    /// Find child elements by local name
    pub fn find_children(&self, local_name: &str) -> Vec<&Element> {
        self.children()
            .filter(|e| e.local_name() == local_name)
            .collect()
    }

    /// Resolve a QName-valued attribute against this element's namespace scope
    pub fn resolve_qname(&self, value: &str) -> Result<QName> {
        self.namespaces.resolve(value)
    }
}

/// XML Document representation
#[derive(Debug, Clone)]
pub struct Document {
    /// Root element of the document
    pub root: Option<Element>,
    /// Where the document came from
    pub location: Location,
}

impl Document {
    /// Parse an XML document held in memory
    pub fn from_string(xml: &str) -> Result<Self> {
        Self::parse_str(xml, Location::Memory("<string>".to_string()))
    }

    /// Parse an XML document and record its location
    pub fn parse_str(xml: &str, location: Location) -> Result<Self> {
        Self::parse_with_limits(xml.as_bytes(), location, &Limits::default())
    }

    /// Parse an XML document from bytes, enforcing size and depth limits
    pub fn parse_with_limits(xml: &[u8], location: Location, limits: &Limits) -> Result<Self> {
        limits.check_xml_size(xml.len())?;

        let mut reader = Reader::from_reader(xml);
        reader.trim_text(false);

        let mut root = None;
        let mut element_stack: Vec<Element> = Vec::new();
        let mut buf = Vec::new();

        loop {
            let position = reader.buffer_position();
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let scope = element_stack.last().map(|p| &p.namespaces);
                    let element = Self::parse_element(&e, scope, position)?;
                    element_stack.push(element);
                    limits.check_xml_depth(element_stack.len())?;
                }
                Ok(Event::End(_)) => {
                    if let Some(current) = element_stack.pop() {
                        match element_stack.last_mut() {
                            Some(parent) => parent.add_child(current),
                            None => root = Some(current),
                        }
                    }
                }
                Ok(Event::Empty(e)) => {
                    let scope = element_stack.last().map(|p| &p.namespaces);
                    let element = Self::parse_element(&e, scope, position)?;
                    limits.check_xml_depth(element_stack.len() + 1)?;
                    match element_stack.last_mut() {
                        Some(parent) => parent.add_child(element),
                        None => root = Some(element),
                    }
                }
                Ok(Event::Text(e)) => {
                    if let Some(current) = element_stack.last_mut() {
                        let text = e
                            .unescape()
                            .map_err(|e| Error::Xml(format!("Failed to unescape text: {}", e)))?;
                        current.add_text(&text);
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some(current) = element_stack.last_mut() {
                        let text = String::from_utf8_lossy(&e.into_inner()).to_string();
                        current.add_text(&text);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::Xml(format!(
                        "Error parsing XML at position {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
                _ => {} // Comments, processing instructions, doctype
            }
            buf.clear();
        }

        if !element_stack.is_empty() {
            return Err(Error::Xml(format!(
                "Unclosed element '{}'",
                element_stack[element_stack.len() - 1].qname
            )));
        }

        Ok(Self { root, location })
    }

    /// Parse element from a start tag, inheriting the parent's namespace scope
    fn parse_element(
        start: &BytesStart,
        parent_scope: Option<&NamespaceContext>,
        position: usize,
    ) -> Result<Element> {
        let name = std::str::from_utf8(start.name().as_ref())
            .map_err(|e| Error::Xml(format!("Invalid element name: {}", e)))?
            .to_string();

        let mut namespaces = parent_scope.cloned().unwrap_or_default();
        let mut raw_attributes = Vec::new();

        for attr_result in start.attributes() {
            let attr =
                attr_result.map_err(|e| Error::Xml(format!("Failed to parse attribute: {}", e)))?;

            let attr_name = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| Error::Xml(format!("Invalid attribute name: {}", e)))?
                .to_string();

            let attr_value = attr
                .unescape_value()
                .map_err(|e| Error::Xml(format!("Failed to unescape attribute value: {}", e)))?
                .to_string();

            if attr_name == "xmlns" {
                namespaces.set_default_namespace(attr_value);
            } else if let Some(prefix) = attr_name.strip_prefix("xmlns:") {
                namespaces.add_prefix(prefix, attr_value);
            } else {
                raw_attributes.push((attr_name, attr_value));
            }
        }

        let qname = namespaces
            .resolve_tag(&name, false)
            .map_err(|e| Error::Xml(format!("Element '{}': {}", name, e)))?;

        let mut element = Element::new(qname);
        element.position = position;
        for (attr_name, value) in raw_attributes {
            let attr_qname = namespaces
                .resolve_tag(&attr_name, true)
                .map_err(|e| Error::Xml(format!("Attribute '{}': {}", attr_name, e)))?;
            element.attributes.insert(attr_qname, value);
        }
        element.namespaces = namespaces;

        Ok(element)
    }

    /// Get the root element
    pub fn root(&self) -> Option<&Element> {
        self.root.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::XSD_NAMESPACE;

    #[test]
    fn test_parse_simple_xml() {
        let xml = r#"<root><child>text</child></root>"#;
        let doc = Document::from_string(xml).unwrap();

        let root = doc.root().unwrap();
        assert_eq!(root.local_name(), "root");
        let children: Vec<_> = root.children().collect();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].local_name(), "child");
        assert_eq!(children[0].text(), "text");
    }

    #[test]
    fn test_parse_with_attributes() {
        let xml = r#"<root attr1="value1" attr2="value2"><child/></root>"#;
        let doc = Document::from_string(xml).unwrap();

        let root = doc.root().unwrap();
        assert_eq!(root.get_attribute("attr1"), Some("value1"));
        assert_eq!(root.get_attribute("attr2"), Some("value2"));
        let keys: Vec<_> = root.attributes.keys().map(|k| k.local_name.as_str()).collect();
        assert_eq!(keys, vec!["attr1", "attr2"]);
    }

    #[test]
    fn test_namespaces_are_resolved_and_inherited() {
        let xml = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns="urn:t">
            <xs:element name="a" type="T"/>
        </xs:schema>"#;
        let doc = Document::from_string(xml).unwrap();

        let root = doc.root().unwrap();
        assert_eq!(root.namespace(), Some(XSD_NAMESPACE));
        let child = root.children().next().unwrap();
        assert_eq!(child.qname, QName::xsd("element"));
        assert_eq!(
            child.resolve_qname(child.get_attribute("type").unwrap()).unwrap(),
            QName::namespaced("urn:t", "T")
        );
    }

    #[test]
    fn test_mixed_content_preserved() {
        let xml = r#"<p>Hello <b>big</b> world</p>"#;
        let doc = Document::from_string(xml).unwrap();
        let root = doc.root().unwrap();
        assert_eq!(root.nodes.len(), 3);
        assert!(matches!(&root.nodes[0], Node::Text(t) if t == "Hello "));
        assert_eq!(root.text(), "Hello  world");
        assert!(root.has_text());
    }

    #[test]
    fn test_unknown_prefix_fails() {
        assert!(Document::from_string("<p:root/>").is_err());
    }

    #[test]
    fn test_depth_limit() {
        let mut limits = Limits::default();
        limits.max_xml_depth = 2;
        let xml = b"<a><b><c/></b></a>";
        let result = Document::parse_with_limits(xml, Location::Memory("x".into()), &limits);
        assert!(matches!(result, Err(Error::LimitExceeded(_))));
    }

    #[test]
    fn test_find_children() {
        let xml = r#"<root><child1/><child2/><child1/></root>"#;
        let doc = Document::from_string(xml).unwrap();
        assert_eq!(doc.root().unwrap().find_children("child1").len(), 2);
    }
}
