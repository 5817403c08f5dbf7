//! Schema document retrieval
//!
//! The compiler never reads files or the network itself. Included and imported
//! schema documents are obtained through a [`SchemaRetriever`], which maps a
//! `schemaLocation` (or, lacking one, the namespace URI) to a parsed document.

use crate::documents::Document;
use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::locations::Location;
use std::collections::HashMap;
use std::fs;

/// Where an include/import asked to be loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalRequest {
    /// A location hint, already resolved against the referencing document
    Location(Location),
    /// An import without a location hint, identified by its namespace
    Namespace(Option<String>),
}

impl std::fmt::Display for RetrievalRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetrievalRequest::Location(loc) => write!(f, "{}", loc),
            RetrievalRequest::Namespace(Some(ns)) => write!(f, "namespace {}", ns),
            RetrievalRequest::Namespace(None) => write!(f, "no-namespace schema"),
        }
    }
}

/// External collaborator supplying schema documents on demand
pub trait SchemaRetriever: Send + Sync {
    /// Fetch and parse the requested schema document
    fn fetch(&self, request: &RetrievalRequest) -> Result<Document>;
}

/// Filesystem retriever; URL locations are refused
#[derive(Debug)]
pub struct FileRetriever {
    /// Resource limits
    limits: Limits,
    /// Namespace URI to file mappings for location-less imports
    namespace_map: HashMap<Option<String>, Location>,
}

impl FileRetriever {
    /// Create a new retriever with default settings
    pub fn new() -> Self {
        Self {
            limits: Limits::default(),
            namespace_map: HashMap::new(),
        }
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Map a namespace to a file for imports that carry no `schemaLocation`
    pub fn with_namespace(mut self, namespace: Option<&str>, location: Location) -> Self {
        self.namespace_map
            .insert(namespace.map(String::from), location);
        self
    }

    /// Load a resource as a string
    pub fn load(&self, location: &Location) -> Result<String> {
        match location {
            Location::Path(path) => {
                let content = fs::read_to_string(path).map_err(|e| {
                    Error::Retrieval(format!("Failed to read file '{}': {}", path.display(), e))
                })?;

                self.limits.check_xml_size(content.len())?;

                Ok(content)
            }
            Location::Url(url) => Err(Error::Retrieval(format!(
                "Remote retrieval is not supported: {}",
                url
            ))),
            Location::Memory(key) => Err(Error::Retrieval(format!(
                "No in-memory resource '{}' available to the file retriever",
                key
            ))),
        }
    }
}

impl Default for FileRetriever {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRetriever for FileRetriever {
    fn fetch(&self, request: &RetrievalRequest) -> Result<Document> {
        let location = match request {
            RetrievalRequest::Location(loc) => loc.clone(),
            RetrievalRequest::Namespace(ns) => self
                .namespace_map
                .get(ns)
                .cloned()
                .ok_or_else(|| Error::Retrieval(format!("No location known for {}", request)))?,
        };
        let text = self.load(&location)?;
        Document::parse_str(&text, location)
    }
}

/// In-memory retriever keyed by location string or namespace URI
#[derive(Debug, Default, Clone)]
pub struct MemoryRetriever {
    by_location: HashMap<String, String>,
    by_namespace: HashMap<Option<String>, String>,
}

impl MemoryRetriever {
    /// Create an empty retriever
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document under a location key
    pub fn with_document(mut self, location: impl Into<String>, xml: impl Into<String>) -> Self {
        self.by_location.insert(location.into(), xml.into());
        self
    }

    /// Register a document for a namespace
    pub fn with_namespace(mut self, namespace: Option<&str>, xml: impl Into<String>) -> Self {
        self.by_namespace
            .insert(namespace.map(String::from), xml.into());
        self
    }
}

impl SchemaRetriever for MemoryRetriever {
    fn fetch(&self, request: &RetrievalRequest) -> Result<Document> {
        let (text, location) = match request {
            RetrievalRequest::Location(loc) => {
                let key = loc.as_string();
                let text = self
                    .by_location
                    .get(&key)
                    .ok_or_else(|| Error::Retrieval(format!("No document registered at '{}'", key)))?;
                (text, loc.clone())
            }
            RetrievalRequest::Namespace(ns) => {
                let text = self
                    .by_namespace
                    .get(ns)
                    .ok_or_else(|| Error::Retrieval(format!("No document registered for {}", request)))?;
                let key = ns.clone().unwrap_or_else(|| "##local".to_string());
                (text, Location::Memory(key))
            }
        };
        Document::parse_str(text, location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "<root>test</root>").unwrap();

        let location = Location::Path(file.path().to_path_buf());
        let retriever = FileRetriever::new();
        let content = retriever.load(&location).unwrap();
        assert!(content.contains("<root>test</root>"));

        let doc = retriever
            .fetch(&RetrievalRequest::Location(location.clone()))
            .unwrap();
        assert_eq!(doc.location, location);
    }

    #[test]
    fn test_size_limit() {
        let mut file = NamedTempFile::new().unwrap();
        let large_content = "x".repeat(11 * 1024 * 1024); // 11 MB
        write!(file, "{}", large_content).unwrap();

        let location = Location::Path(file.path().to_path_buf());
        let retriever = FileRetriever::new().with_limits(Limits::strict());
        assert!(retriever.load(&location).is_err());
    }

    #[test]
    fn test_remote_refused() {
        let retriever = FileRetriever::new();
        let request = RetrievalRequest::Location(Location::parse("http://example.com/a.xsd"));
        assert!(matches!(retriever.fetch(&request), Err(Error::Retrieval(_))));
    }

    #[test]
    fn test_memory_retriever() {
        let retriever = MemoryRetriever::new()
            .with_document("a.xsd", "<a/>")
            .with_namespace(Some("urn:b"), "<b/>");

        let doc = retriever
            .fetch(&RetrievalRequest::Location(Location::Memory("a.xsd".into())))
            .unwrap();
        assert_eq!(doc.root().unwrap().local_name(), "a");

        let doc = retriever
            .fetch(&RetrievalRequest::Namespace(Some("urn:b".into())))
            .unwrap();
        assert_eq!(doc.root().unwrap().local_name(), "b");

        assert!(retriever
            .fetch(&RetrievalRequest::Namespace(None))
            .is_err());
    }
}
