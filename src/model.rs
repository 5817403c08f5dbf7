//! Compilation entry point and the compiled component model
//!
//! [`Compiler`] runs the whole pipeline over a set of schema documents:
//! build, resolve, derive, close substitution groups, compile content
//! models and check value constraints. Compilation is all-or-nothing: any
//! error fails it, and every error found by a stage is reported together
//! in a [`CompileError`].
//!
//! The resulting [`ComponentModel`] is immutable and `Send + Sync`; any
//! number of documents may validate against it concurrently.

use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::info;

use crate::automata::{compile_content_model, ContentModel};
use crate::builder::SchemaBuilder;
use crate::components::{
    describe, Category, ComponentId, ElementDecl, ElementId, TypeDefinition, TypeId,
};
use crate::derivation::{
    check_value_constraints, derive_all, element_types, substitution_groups, DerivedTypes,
    EffectiveAttribute, EffectiveComplexType, EffectiveSimpleType, SubstitutionGroups, TypeInfo,
};
use crate::documents::Document;
use crate::error::{CompileError, Error, ValidationError, ValidationErrorKind};
use crate::limits::Limits;
use crate::loaders::SchemaRetriever;
use crate::namespaces::QName;
use crate::registry::{bootstrap, NamespaceRegistry, SchemaArena};
use crate::resolver::{ResolutionReport, Resolver};
use crate::validation::{self, ContentEvent, ValidationMode};

/// Configurable schema compiler
pub struct Compiler {
    limits: Limits,
    retriever: Option<Box<dyn SchemaRetriever>>,
    parallel: bool,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("limits", &self.limits)
            .field("retriever", &self.retriever.is_some())
            .field("parallel", &self.parallel)
            .finish()
    }
}

impl Compiler {
    /// Default limits, no retriever, parallel passes
    pub fn new() -> Self {
        Self {
            limits: Limits::default(),
            retriever: None,
            parallel: true,
        }
    }

    /// Set the resource limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the collaborator used for includes and on-demand imports
    pub fn with_retriever(mut self, retriever: impl SchemaRetriever + 'static) -> Self {
        self.retriever = Some(Box::new(retriever));
        self
    }

    /// Enable or disable rayon parallelism in resolution and content model compilation
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Compile a set of schema documents into a component model
    pub fn compile(&self, documents: &[Document]) -> Result<ComponentModel, CompileError> {
        let (mut arena, registry) = bootstrap()?;
        let retriever = self.retriever.as_deref();

        let mut errors = Vec::new();
        {
            let mut builder = SchemaBuilder::new(&mut arena, &registry, &self.limits);
            if let Some(retriever) = retriever {
                builder = builder.with_retriever(retriever);
            }
            for document in documents {
                if let Err(e) = builder.build(document) {
                    errors.push(e);
                }
            }
            errors.extend(builder.take_errors());
        }
        if !errors.is_empty() {
            return Err(CompileError::new(errors));
        }

        let mut resolver = Resolver::new(&mut arena, &registry, &self.limits).with_parallelism(self.parallel);
        if let Some(retriever) = retriever {
            resolver = resolver.with_retriever(retriever);
        }
        let (report, errors) = resolver.resolve();
        if !errors.is_empty() {
            return Err(CompileError::new(errors));
        }

        let (derived, mut errors) = derive_all(&arena);
        let element_types = element_types(&arena);
        let (substitutions, substitution_errors) = substitution_groups(&arena, &derived, &element_types);
        errors.extend(substitution_errors);
        errors.extend(check_value_constraints(&arena, &derived, &element_types));

        let type_ids: Vec<TypeId> = arena.type_ids().filter(|id| derived.get(*id).is_some()).collect();
        let compile_one = |id: &TypeId| {
            compile_content_model(&arena, &derived, &substitutions, &self.limits, *id).map(|model| (*id, model))
        };
        let compiled: Vec<Result<(TypeId, ContentModel), Error>> = if self.parallel {
            type_ids.par_iter().map(compile_one).collect()
        } else {
            type_ids.iter().map(compile_one).collect()
        };

        let mut content_models = vec![None; arena.type_count()];
        for result in compiled {
            match result {
                Ok((id, model)) => content_models[id.index()] = Some(model),
                Err(e) => errors.push(e),
            }
        }
        if !errors.is_empty() {
            return Err(CompileError::new(errors));
        }

        info!(
            components = arena.len(),
            passes = report.passes,
            imports = report.imports_loaded,
            "schema compiled"
        );
        Ok(ComponentModel {
            arena,
            registry,
            derived,
            element_types,
            substitutions,
            content_models,
            report,
            limits: self.limits.clone(),
        })
    }
}

/// Compile schema documents with default settings
///
/// Without a retriever every include and on-demand import fails.
pub fn compile(documents: &[Document]) -> Result<ComponentModel, CompileError> {
    Compiler::new().compile(documents)
}

/// A fully resolved and compiled schema
#[derive(Debug)]
pub struct ComponentModel {
    arena: SchemaArena,
    registry: NamespaceRegistry,
    derived: DerivedTypes,
    element_types: Vec<TypeId>,
    substitutions: SubstitutionGroups,
    content_models: Vec<Option<ContentModel>>,
    report: ResolutionReport,
    limits: Limits,
}

impl ComponentModel {
    /// Look up a global type definition
    pub fn resolve_type(&self, namespace: Option<&str>, name: &str) -> Option<TypeId> {
        match self.registry.get(&QName::new(namespace, name), Category::Type) {
            Some(ComponentId::Type(id)) => Some(id),
            _ => None,
        }
    }

    /// Look up a global element declaration
    pub fn resolve_element(&self, namespace: Option<&str>, name: &str) -> Option<ElementId> {
        self.global_element(&QName::new(namespace, name))
    }

    pub(crate) fn global_element(&self, name: &QName) -> Option<ElementId> {
        match self.registry.get(name, Category::Element) {
            Some(ComponentId::Element(id)) => Some(id),
            _ => None,
        }
    }

    /// Raw definition of a type
    pub fn type_definition(&self, id: TypeId) -> &TypeDefinition {
        self.arena.type_def(id)
    }

    /// Element declaration
    pub fn element(&self, id: ElementId) -> &ElementDecl {
        self.arena.element(id)
    }

    /// Readable name of a type, for diagnostics
    pub fn type_name(&self, id: TypeId) -> String {
        describe(Category::Type, self.arena.type_def(id).info())
    }

    /// Derivation result of a type
    pub fn type_info(&self, id: TypeId) -> Option<&TypeInfo> {
        self.derived.get(id)
    }

    /// Effective view of a simple type
    pub fn effective_simple_type(&self, id: TypeId) -> Option<&EffectiveSimpleType> {
        self.derived.simple(id)
    }

    /// Effective view of a complex type
    pub fn effective_complex_type(&self, id: TypeId) -> Option<&EffectiveComplexType> {
        self.derived.complex(id)
    }

    /// The type and its ancestors, ending with `xs:anyType`
    pub fn derivation_chain(&self, id: TypeId) -> Vec<TypeId> {
        self.derived.chain(id)
    }

    /// Whether `derived` is `base` or derives from it
    pub fn is_derived_from(&self, derived: TypeId, base: TypeId) -> bool {
        self.derived.is_derived_from(derived, base)
    }

    /// Effective attribute uses of a complex type
    pub fn attributes(&self, id: TypeId) -> Option<&IndexMap<QName, EffectiveAttribute>> {
        self.derived.complex(id).map(|c| &c.attributes)
    }

    /// Type an element declaration validates against
    pub fn element_type(&self, id: ElementId) -> TypeId {
        self.element_types
            .get(id.index())
            .copied()
            .unwrap_or(TypeId::ANY_TYPE)
    }

    /// Elements that may substitute for a head, transitively
    pub fn substitution_members(&self, head: ElementId) -> &[ElementId] {
        self.substitutions.members(head)
    }

    /// Compiled content model of a type
    pub fn content_model(&self, id: TypeId) -> Option<&ContentModel> {
        self.content_models.get(id.index()).and_then(Option::as_ref)
    }

    /// Validate a stream of content events against a type
    pub fn validate<I>(&self, type_id: TypeId, events: I) -> Result<(), ValidationError>
    where
        I: IntoIterator<Item = ContentEvent>,
    {
        validation::validate_events(self, type_id, events)
    }

    /// Normalize and check a literal against a simple type or simple content
    pub fn validate_value(&self, type_id: TypeId, value: &str) -> Result<String, ValidationError> {
        self.derived.validate_value(type_id, value)
    }

    /// Validate an instance document, stopping at the first error
    pub fn validate_document(&self, document: &Document) -> Result<(), ValidationError> {
        validation::validate_document(self, document, ValidationMode::Strict).map(|_| ())
    }

    /// Every validation error of an instance document
    pub fn document_errors(&self, document: &Document) -> Vec<ValidationError> {
        validation::validate_document(self, document, ValidationMode::Lazy).unwrap_or_else(|e| vec![e])
    }

    /// Whether an instance document is valid
    pub fn is_valid(&self, document: &Document) -> bool {
        self.validate_document(document).is_ok()
    }

    /// Global components of a category, sorted by name
    pub fn globals(&self, category: Category) -> Vec<(QName, ComponentId)> {
        let mut globals: Vec<(QName, ComponentId)> = self
            .registry
            .namespaces()
            .iter()
            .flat_map(|ns| self.registry.names(ns.as_deref(), category))
            .filter(|(name, _)| !name.is_xsd())
            .collect();
        globals.sort();
        globals
    }

    /// Statistics of the resolution stage
    pub fn report(&self) -> &ResolutionReport {
        &self.report
    }

    /// Limits the model was compiled with
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// The namespace registry, read-only after compilation
    pub fn registry(&self) -> &NamespaceRegistry {
        &self.registry
    }

    /// The component arena
    pub fn arena(&self) -> &SchemaArena {
        &self.arena
    }

    pub(crate) fn unknown_type(&self, id: TypeId) -> ValidationError {
        ValidationError::new(
            ValidationErrorKind::UnknownComponent,
            format!("{} has no compiled content model", self.type_name(id)),
        )
    }
}
