//! Error types for xmlschema-compiler
//!
//! Schema compilation errors are collected into a [`CompileError`] so that a
//! single run reports every problem it found. Document validation errors are
//! reported through [`ValidationError`] and never affect the compiled model.

use std::fmt;
use thiserror::Error;

use crate::components::Category;
use crate::namespaces::QName;

/// Result type alias using the crate [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for schema compilation and validation
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed schema document; aborts processing of that document
    #[error("schema structure error: {message}{}", fmt_location(.location))]
    SchemaStructure {
        /// What is wrong with the node
        message: String,
        /// Document location and offending node
        location: Option<String>,
    },

    /// A distinct component is already bound to this name
    #[error("duplicate {category} declaration '{name}'")]
    DuplicateDeclaration {
        /// Qualified name of the component
        name: QName,
        /// Component category
        category: Category,
    },

    /// A reference stayed unbound when resolution reached its fixed point
    #[error("unresolvable {category} reference '{name}' from {referenced_from}{}", fmt_reason(.reason))]
    UnresolvableReference {
        /// The missing name
        name: QName,
        /// Category the name was looked up in
        category: Category,
        /// Description of the referencing component
        referenced_from: String,
        /// Extra context (e.g. the namespace was never imported)
        reason: Option<String>,
    },

    /// The retrieval collaborator could not supply an imported namespace
    #[error("import of namespace '{}' unavailable: {reason}", .namespace.as_deref().unwrap_or("##local"))]
    ImportUnavailable {
        /// Imported namespace (None for no-namespace imports)
        namespace: Option<String>,
        /// Why the retrieval failed
        reason: String,
    },

    /// A type's base-type chain revisits itself
    #[error("circular type definition: {}", fmt_chain(.chain))]
    CircularTypeDefinition {
        /// Names along the cycle, starting and ending with the repeated type
        chain: Vec<String>,
    },

    /// A model group or attribute group contains itself
    #[error("circular {category} reference: {}", fmt_chain(.chain))]
    CircularGroupReference {
        /// Group names along the cycle
        chain: Vec<String>,
        /// Either a model group or attribute group
        category: Category,
    },

    /// A derived simple type loosens an ancestor facet
    #[error("invalid restriction of facet '{facet}' in type {type_name}: {reason}")]
    InvalidFacetRestriction {
        /// Derived type description
        type_name: String,
        /// Facet name
        facet: String,
        /// Why the restriction is invalid
        reason: String,
    },

    /// An extension redeclares an inherited attribute
    #[error("duplicate attribute '{attribute}' in type {type_name}")]
    DuplicateAttribute {
        /// Derived type description
        type_name: String,
        /// Attribute name
        attribute: QName,
    },

    /// A restriction widens an inherited attribute
    #[error("invalid restriction of attribute '{attribute}' in type {type_name}: {reason}")]
    InvalidAttributeRestriction {
        /// Derived type description
        type_name: String,
        /// Attribute name
        attribute: QName,
        /// Why the restriction is invalid
        reason: String,
    },

    /// A derivation combines incompatible kinds of types
    #[error("invalid derivation of type {type_name}: {reason}")]
    InvalidDerivation {
        /// Derived type description
        type_name: String,
        /// Why the derivation is invalid
        reason: String,
    },

    /// Two wildcards of a content model compete for the same element names
    #[error("ambiguous content model of {type_name}: {first} and {second} admit the same elements")]
    AmbiguousContentModel {
        /// Owning type description
        type_name: String,
        /// First competing wildcard
        first: String,
        /// Second competing wildcard
        second: String,
    },

    /// A default or fixed value is not valid for its declared type
    #[error("invalid {constraint} value '{value}' on {component}: {reason}")]
    InvalidValueConstraint {
        /// Declaring component description
        component: String,
        /// `default` or `fixed`
        constraint: &'static str,
        /// The literal value
        value: String,
        /// Facet or lexical failure
        reason: String,
    },

    /// Document retrieval failed
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// Limit exceeded error
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// Document-level validation error
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Name error (invalid XML name)
    #[error("name error: {0}")]
    Name(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// XML parsing error
    #[error("XML error: {0}")]
    Xml(String),

    /// URL parsing error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Build a structure error for a schema node
    pub fn structure(message: impl Into<String>, location: impl Into<String>) -> Self {
        Error::SchemaStructure {
            message: message.into(),
            location: Some(location.into()),
        }
    }

    /// Whether this error belongs to document validation rather than compilation
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

fn fmt_location(location: &Option<String>) -> String {
    location
        .as_ref()
        .map(|l| format!(" (at {})", l))
        .unwrap_or_default()
}

fn fmt_reason(reason: &Option<String>) -> String {
    reason
        .as_ref()
        .map(|r| format!(": {}", r))
        .unwrap_or_default()
}

fn fmt_chain(chain: &[String]) -> String {
    chain.join(" -> ")
}

/// All diagnostics of a failed schema compilation
#[derive(Debug)]
pub struct CompileError {
    /// Every error found, in discovery order
    pub errors: Vec<Error>,
}

impl CompileError {
    /// Wrap a non-empty list of errors
    pub fn new(errors: Vec<Error>) -> Self {
        Self { errors }
    }

    /// Number of collected errors
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// True when no error was collected
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterate over collected errors
    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        self.errors.iter()
    }

    /// Check whether any collected error matches a predicate
    pub fn any(&self, predicate: impl Fn(&Error) -> bool) -> bool {
        self.errors.iter().any(predicate)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schema compilation failed with {} error(s)", self.errors.len())?;
        for err in &self.errors {
            write!(f, "\n  - {}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

impl From<Error> for CompileError {
    fn from(err: Error) -> Self {
        Self { errors: vec![err] }
    }
}

/// Kind of a document validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// No transition for the element in the current automaton state
    UnexpectedElement,
    /// End of content reached in a non-accepting state
    IncompleteContent,
    /// Character data where the content type allows none
    UnexpectedText,
    /// A simple value failed its type's facets
    InvalidValue,
    /// A required attribute is absent
    MissingAttribute,
    /// An attribute that is neither declared nor admitted by a wildcard
    UnexpectedAttribute,
    /// The requested type or element does not exist in the model
    UnknownComponent,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnexpectedElement => "unexpected element",
            Self::IncompleteContent => "incomplete content",
            Self::UnexpectedText => "unexpected text",
            Self::InvalidValue => "invalid value",
            Self::MissingAttribute => "missing attribute",
            Self::UnexpectedAttribute => "unexpected attribute",
            Self::UnknownComponent => "unknown component",
        };
        f.write_str(s)
    }
}

/// XML Schema validation error with context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Failure kind
    pub kind: ValidationErrorKind,
    /// Error message
    pub message: String,
    /// Path to the element that failed validation
    pub path: Option<String>,
    /// Element names that would have been accepted
    pub expected: Vec<String>,
    /// Original reason
    pub reason: Option<String>,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
            expected: Vec::new(),
            reason: None,
        }
    }

    /// Set the path where validation failed
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the expected element names
    pub fn with_expected(mut self, expected: Vec<String>) -> Self {
        self.expected = expected;
        self
    }

    /// Set the reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;

        if let Some(ref reason) = self.reason {
            write!(f, "\n\nReason: {}", reason)?;
        }

        if let Some(ref path) = self.path {
            write!(f, "\n\nPath: {}", path)?;
        }

        if !self.expected.is_empty() {
            write!(f, "\n\nExpected: {}", self.expected.join(", "))?;
        }

        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new(ValidationErrorKind::UnexpectedElement, "element 'b'")
            .with_reason("no transition from state 0")
            .with_path("/root/b")
            .with_expected(vec!["a".to_string()]);

        let msg = format!("{}", err);
        assert!(msg.starts_with("unexpected element: element 'b'"));
        assert!(msg.contains("Reason:"));
        assert!(msg.contains("Path: /root/b"));
        assert!(msg.contains("Expected: a"));
    }

    #[test]
    fn test_structure_error_display() {
        let err = Error::structure("complexType has two content models", "schema.xsd: complexType 'T'");
        let msg = err.to_string();
        assert!(msg.contains("two content models"));
        assert!(msg.contains("(at schema.xsd: complexType 'T')"));
    }

    #[test]
    fn test_circular_chain_display() {
        let err = Error::CircularTypeDefinition {
            chain: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "circular type definition: A -> B -> A");
    }

    #[test]
    fn test_compile_error_collects() {
        let err = CompileError::new(vec![
            Error::Retrieval("x".into()),
            Error::LimitExceeded("y".into()),
        ]);
        assert_eq!(err.len(), 2);
        assert!(err.any(|e| matches!(e, Error::LimitExceeded(_))));
        assert!(err.to_string().contains("2 error(s)"));
    }

    #[test]
    fn test_error_conversion() {
        let val_err = ValidationError::new(ValidationErrorKind::InvalidValue, "test");
        let err: Error = val_err.into();
        assert!(err.is_validation());
    }
}
