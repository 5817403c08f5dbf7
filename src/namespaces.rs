//! XML namespace handling
//!
//! Qualified names (QNames) and prefix scopes used to resolve the QName-valued
//! attributes of schema documents (`type`, `ref`, `base`, `substitutionGroup`, ...).

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// XSD 1.0 namespace
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// XML Schema instance namespace
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// XML namespace, bound to the `xml` prefix
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// XML Namespace URI
pub type NamespaceUri = String;

/// Namespace prefix
pub type Prefix = String;

/// Qualified name (QName) - combination of namespace and local name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct QName {
    /// Namespace URI (None for the absent namespace)
    pub namespace: Option<NamespaceUri>,
    /// Local name
    pub local_name: String,
}

impl QName {
    /// Create a new QName
    pub fn new(namespace: Option<impl Into<String>>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(|s| s.into()),
            local_name: local_name.into(),
        }
    }

    /// Create a QName without a namespace
    pub fn local(local_name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local_name: local_name.into(),
        }
    }

    /// Create a QName with a namespace
    pub fn namespaced(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            local_name: local_name.into(),
        }
    }

    /// Create a QName in the XSD namespace
    pub fn xsd(local_name: impl Into<String>) -> Self {
        Self::namespaced(XSD_NAMESPACE, local_name)
    }

    /// Namespace as a string slice
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Whether the name lives in the XSD namespace
    pub fn is_xsd(&self) -> bool {
        self.namespace.as_deref() == Some(XSD_NAMESPACE)
    }

    /// Parse the `{namespace}local` (Clark) notation produced by `Display`
    pub fn from_clark(s: &str) -> Result<Self> {
        match s.strip_prefix('{') {
            Some(rest) => {
                let (ns, local) = rest
                    .split_once('}')
                    .ok_or_else(|| Error::Name(format!("Unterminated namespace in '{}'", s)))?;
                let namespace = if ns.is_empty() { None } else { Some(ns.to_string()) };
                Ok(Self {
                    namespace,
                    local_name: local.to_string(),
                })
            }
            None => Ok(Self::local(s)),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local_name),
            None => f.write_str(&self.local_name),
        }
    }
}

/// Namespace context for resolving prefixes
///
/// Contexts are cumulative: a child element's context starts as a copy of its
/// parent's and then applies its own `xmlns` declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceContext {
    /// Mapping from prefix to namespace URI
    prefixes: HashMap<Prefix, NamespaceUri>,
    /// Default namespace (no prefix)
    default_namespace: Option<NamespaceUri>,
}

impl NamespaceContext {
    /// Create a new namespace context with only the `xml` prefix bound
    pub fn new() -> Self {
        let mut prefixes = HashMap::new();
        prefixes.insert("xml".to_string(), XML_NAMESPACE.to_string());
        Self {
            prefixes,
            default_namespace: None,
        }
    }

    /// Add a namespace prefix mapping
    pub fn add_prefix(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        self.prefixes.insert(prefix.into(), namespace.into());
    }

    /// Set the default namespace; an empty URI undeclares it
    pub fn set_default_namespace(&mut self, namespace: impl Into<String>) {
        let namespace = namespace.into();
        self.default_namespace = if namespace.is_empty() { None } else { Some(namespace) };
    }

    /// Get the namespace for a prefix
    pub fn get_namespace(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(|s| s.as_str())
    }

    /// Get the default namespace
    pub fn get_default_namespace(&self) -> Option<&str> {
        self.default_namespace.as_deref()
    }

    /// Resolve a prefixed name to a QName
    ///
    /// Unprefixed names take the default namespace, which is how QName-valued
    /// schema attributes are interpreted.
    pub fn resolve(&self, prefixed_name: &str) -> Result<QName> {
        let prefixed_name = prefixed_name.trim();
        if let Some((prefix, local)) = prefixed_name.split_once(':') {
            let namespace = self
                .get_namespace(prefix)
                .ok_or_else(|| Error::Name(format!("Unknown prefix: {}", prefix)))?;
            Ok(QName::namespaced(namespace, local))
        } else {
            Ok(QName::new(self.default_namespace.clone(), prefixed_name))
        }
    }

    /// Resolve an element or attribute tag; attributes never take the default namespace
    pub fn resolve_tag(&self, tag: &str, is_attribute: bool) -> Result<QName> {
        match tag.split_once(':') {
            Some(_) => self.resolve(tag),
            None if is_attribute => Ok(QName::local(tag)),
            None => Ok(QName::new(self.default_namespace.clone(), tag)),
        }
    }
}

impl Default for NamespaceContext {
    fn default() -> Self {
        Self::new()
    }
}
