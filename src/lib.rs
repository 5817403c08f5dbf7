//! # xmlschema-compiler
//!
//! Compiles XML Schema (XSD 1.0) documents into a fully resolved, in-memory
//! component model, and compiles the element content of every complex type
//! into a deterministic automaton.
//!
//! The pipeline runs leaf-first:
//!
//! 1. [`builder`] walks each schema document and creates unresolved components
//!    in a [`registry::SchemaArena`], registering global names in the
//!    [`registry::NamespaceRegistry`]
//! 2. [`resolver`] binds every reference by fixed-point iteration, loading
//!    imported namespaces on demand
//! 3. [`derivation`] folds base chains into effective simple and complex types
//! 4. [`automata`] turns particle trees into DFAs
//!
//! The result is a [`ComponentModel`] that validates content event streams
//! and whole instance documents.
//!
//! ## Example
//!
//! ```rust,ignore
//! use xmlschema_compiler::{compile, Document};
//!
//! let schema = Document::from_string(xsd)?;
//! let model = compile(&[schema])?;
//!
//! let order = model.resolve_type(Some("urn:orders"), "Order").unwrap();
//! let json = model.content_model(order).unwrap().to_json()?;
//!
//! model.validate_document(&Document::from_string(xml)?)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod limits;

// Names and locations
pub mod namespaces;
pub mod names;
pub mod locations;

// Resource loading
pub mod loaders;
pub mod documents;

// Component model
pub mod components;
pub mod registry;

// Compilation stages
pub mod builder;
pub mod resolver;
pub mod derivation;
pub mod automata;

// Entry point and runtime validation
pub mod model;
pub mod validation;

pub use automata::{Automaton, ContentModel, Symbol};
pub use documents::Document;
pub use error::{CompileError, Error, Result, ValidationError, ValidationErrorKind};
pub use limits::Limits;
pub use loaders::{FileRetriever, MemoryRetriever, RetrievalRequest, SchemaRetriever};
pub use model::{compile, Compiler, ComponentModel};
pub use namespaces::QName;
pub use validation::{ContentEvent, ValidationMode};

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
