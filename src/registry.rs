//! Namespace registry and component arena
//!
//! The [`SchemaArena`] owns every component of a compilation; all cross
//! references are ids into it. The [`NamespaceRegistry`] maps qualified names
//! to those ids, one table per (namespace, category), and records which
//! documents were loaded for each namespace and what they import.
//!
//! The registry is shared between resolver workers and guards its tables with
//! a single `RwLock`: `declare` takes the write lock, `lookup` the read lock.

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::components::builtins::{any_simple_type, any_type};
use crate::components::{
    AttributeDecl, AttributeGroupDef, AttributeGroupId, AttributeId, BuiltinType, Category,
    ComponentId, ComponentInfo, DocumentId, ElementDecl, ElementId, GroupId, HasReferences,
    AnyReference, ModelGroupDef, TypeDefinition, TypeId,
};
use crate::error::{Error, Result};
use crate::locations::Location;
use crate::namespaces::{QName, XSD_NAMESPACE};

/// An `xs:import` edge of a schema document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEdge {
    /// Imported namespace; None for a no-namespace import
    pub namespace: Option<String>,
    /// `schemaLocation` hint, already joined to the importing document's location
    pub location: Option<Location>,
}

/// A loaded schema document
#[derive(Debug, Clone)]
pub struct DocumentInfo {
    /// Where the document was retrieved from
    pub location: Location,
    /// Effective target namespace (the includer's for chameleon includes)
    pub target_namespace: Option<String>,
    /// The document that included this one
    pub included_by: Option<DocumentId>,
    /// Import edges, in document order
    pub imports: Vec<ImportEdge>,
}

impl DocumentInfo {
    /// A top-level document with no imports yet
    pub fn new(location: Location, target_namespace: Option<String>) -> Self {
        Self {
            location,
            target_namespace,
            included_by: None,
            imports: Vec::new(),
        }
    }
}

/// Per-namespace tables
#[derive(Debug, Default)]
struct NamespaceEntry {
    tables: [IndexMap<String, ComponentId>; 5],
    documents: Vec<DocumentId>,
}

#[derive(Debug, Default)]
struct Tables {
    namespaces: IndexMap<Option<String>, NamespaceEntry>,
    documents: Vec<DocumentInfo>,
}

/// Name bindings of every namespace seen during a compilation
#[derive(Debug, Default)]
pub struct NamespaceRegistry {
    inner: RwLock<Tables>,
}

impl NamespaceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a name; fails if a distinct component already holds it
    pub fn declare(&self, name: &QName, id: ComponentId) -> Result<()> {
        let category = id.category();
        let mut tables = self.inner.write();
        let entry = tables
            .namespaces
            .entry(name.namespace.clone())
            .or_default();
        let table = &mut entry.tables[category.slot()];
        match table.get(&name.local_name) {
            Some(existing) if *existing == id => Ok(()),
            Some(_) => Err(Error::DuplicateDeclaration {
                name: name.clone(),
                category,
            }),
            None => {
                table.insert(name.local_name.clone(), id);
                Ok(())
            }
        }
    }

    /// Look a name up, returning the component or an unresolvable-reference error
    pub fn lookup(&self, name: &QName, category: Category) -> Result<ComponentId> {
        self.get(name, category)
            .ok_or_else(|| Error::UnresolvableReference {
                name: name.clone(),
                category,
                referenced_from: "lookup".to_string(),
                reason: None,
            })
    }

    /// Look a name up without building an error
    pub fn get(&self, name: &QName, category: Category) -> Option<ComponentId> {
        let tables = self.inner.read();
        tables
            .namespaces
            .get(&name.namespace)
            .and_then(|entry| entry.tables[category.slot()].get(&name.local_name))
            .copied()
    }

    /// Record a loaded document; its namespace counts as loaded from now on
    pub fn register_document(&self, info: DocumentInfo) -> DocumentId {
        let mut tables = self.inner.write();
        let id = DocumentId::from_index(tables.documents.len());
        tables
            .namespaces
            .entry(info.target_namespace.clone())
            .or_default()
            .documents
            .push(id);
        tables.documents.push(info);
        id
    }

    /// Record an import edge of a document
    pub fn register_import(&self, document: DocumentId, edge: ImportEdge) {
        let mut tables = self.inner.write();
        if let Some(info) = tables.documents.get_mut(document.index()) {
            if !info.imports.contains(&edge) {
                info.imports.push(edge);
            }
        }
    }

    /// A snapshot of a document's record
    pub fn document(&self, id: DocumentId) -> Option<DocumentInfo> {
        self.inner.read().documents.get(id.index()).cloned()
    }

    /// The document already loaded from a location, if any
    pub fn find_document(&self, location: &Location) -> Option<DocumentId> {
        self.inner
            .read()
            .documents
            .iter()
            .position(|d| d.location == *location)
            .map(DocumentId::from_index)
    }

    /// Number of loaded documents (the builtin pseudo-document included)
    pub fn document_count(&self) -> usize {
        self.inner.read().documents.len()
    }

    /// Whether at least one document was loaded for the namespace
    pub fn is_loaded(&self, namespace: Option<&str>) -> bool {
        let key = namespace.map(String::from);
        self.inner
            .read()
            .namespaces
            .get(&key)
            .map_or(false, |entry| !entry.documents.is_empty())
    }

    /// Whether references from `document` may name components of `namespace`
    ///
    /// Visible namespaces are the document's own target namespace, the XSD
    /// namespace, and every namespace imported by the document or by a
    /// document that (transitively) includes it.
    pub fn is_visible(&self, document: DocumentId, namespace: Option<&str>) -> bool {
        if namespace == Some(XSD_NAMESPACE) {
            return true;
        }
        let tables = self.inner.read();
        let mut current = tables.documents.get(document.index());
        if let Some(info) = current {
            if info.target_namespace.as_deref() == namespace {
                return true;
            }
        }
        while let Some(info) = current {
            if info.imports.iter().any(|edge| edge.namespace.as_deref() == namespace) {
                return true;
            }
            current = info.included_by.and_then(|id| tables.documents.get(id.index()));
        }
        false
    }

    /// Every recorded import edge naming `namespace`, hinted ones first
    pub fn imports_of(&self, namespace: Option<&str>) -> Vec<ImportEdge> {
        let tables = self.inner.read();
        let mut edges: Vec<ImportEdge> = tables
            .documents
            .iter()
            .flat_map(|info| info.imports.iter())
            .filter(|edge| edge.namespace.as_deref() == namespace)
            .cloned()
            .collect();
        edges.sort_by_key(|edge| edge.location.is_none());
        edges.dedup();
        edges
    }

    /// Namespaces with at least one declared component or document
    pub fn namespaces(&self) -> Vec<Option<String>> {
        self.inner.read().namespaces.keys().cloned().collect()
    }

    /// Declared names of a category in a namespace, in declaration order
    pub fn names(&self, namespace: Option<&str>, category: Category) -> Vec<(QName, ComponentId)> {
        let key = namespace.map(String::from);
        let tables = self.inner.read();
        match tables.namespaces.get(&key) {
            Some(entry) => entry.tables[category.slot()]
                .iter()
                .map(|(local, id)| (QName::new(key.clone(), local.clone()), *id))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Number of names declared in a category across all namespaces
    pub fn count(&self, category: Category) -> usize {
        self.inner
            .read()
            .namespaces
            .values()
            .map(|entry| entry.tables[category.slot()].len())
            .sum()
    }
}

/// Owner of every component of a compilation
#[derive(Debug, Default)]
pub struct SchemaArena {
    types: Vec<TypeDefinition>,
    elements: Vec<ElementDecl>,
    attributes: Vec<AttributeDecl>,
    groups: Vec<ModelGroupDef>,
    attribute_groups: Vec<AttributeGroupDef>,
}

impl SchemaArena {
    /// Add a type definition
    pub fn add_type(&mut self, def: TypeDefinition) -> TypeId {
        self.types.push(def);
        TypeId::from_index(self.types.len() - 1)
    }

    /// Add an element declaration
    pub fn add_element(&mut self, decl: ElementDecl) -> ElementId {
        self.elements.push(decl);
        ElementId::from_index(self.elements.len() - 1)
    }

    /// Add an attribute declaration
    pub fn add_attribute(&mut self, decl: AttributeDecl) -> AttributeId {
        self.attributes.push(decl);
        AttributeId::from_index(self.attributes.len() - 1)
    }

    /// Add a model group definition
    pub fn add_group(&mut self, def: ModelGroupDef) -> GroupId {
        self.groups.push(def);
        GroupId::from_index(self.groups.len() - 1)
    }

    /// Add an attribute group definition
    pub fn add_attribute_group(&mut self, def: AttributeGroupDef) -> AttributeGroupId {
        self.attribute_groups.push(def);
        AttributeGroupId::from_index(self.attribute_groups.len() - 1)
    }

    /// A type definition; ids are only handed out by this arena
    pub fn type_def(&self, id: TypeId) -> &TypeDefinition {
        &self.types[id.index()]
    }

    /// An element declaration
    pub fn element(&self, id: ElementId) -> &ElementDecl {
        &self.elements[id.index()]
    }

    pub(crate) fn element_mut(&mut self, id: ElementId) -> &mut ElementDecl {
        &mut self.elements[id.index()]
    }

    /// An attribute declaration
    pub fn attribute(&self, id: AttributeId) -> &AttributeDecl {
        &self.attributes[id.index()]
    }

    /// A model group definition
    pub fn group(&self, id: GroupId) -> &ModelGroupDef {
        &self.groups[id.index()]
    }

    /// An attribute group definition
    pub fn attribute_group(&self, id: AttributeGroupId) -> &AttributeGroupDef {
        &self.attribute_groups[id.index()]
    }

    /// Number of type definitions
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Number of element declarations
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Total number of components
    pub fn len(&self) -> usize {
        self.types.len()
            + self.elements.len()
            + self.attributes.len()
            + self.groups.len()
            + self.attribute_groups.len()
    }

    /// Check if the arena holds no component
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All type ids, in arena order
    pub fn type_ids(&self) -> impl Iterator<Item = TypeId> {
        (0..self.types.len()).map(TypeId::from_index)
    }

    /// All element ids, in arena order
    pub fn element_ids(&self) -> impl Iterator<Item = ElementId> {
        (0..self.elements.len()).map(ElementId::from_index)
    }

    /// All model group definition ids
    pub fn group_ids(&self) -> impl Iterator<Item = GroupId> {
        (0..self.groups.len()).map(GroupId::from_index)
    }

    /// All attribute group definition ids
    pub fn attribute_group_ids(&self) -> impl Iterator<Item = AttributeGroupId> {
        (0..self.attribute_groups.len()).map(AttributeGroupId::from_index)
    }

    /// Ids of every component, in category then arena order
    pub fn component_ids(&self) -> Vec<ComponentId> {
        let mut ids = Vec::with_capacity(self.len());
        ids.extend(self.type_ids().map(ComponentId::Type));
        ids.extend(self.element_ids().map(ComponentId::Element));
        ids.extend((0..self.attributes.len()).map(|i| ComponentId::Attribute(AttributeId::from_index(i))));
        ids.extend((0..self.groups.len()).map(|i| ComponentId::Group(GroupId::from_index(i))));
        ids.extend(
            (0..self.attribute_groups.len())
                .map(|i| ComponentId::AttributeGroup(AttributeGroupId::from_index(i))),
        );
        ids
    }

    /// Shared fields of any component
    pub fn info(&self, id: ComponentId) -> &ComponentInfo {
        match id {
            ComponentId::Type(id) => self.type_def(id).info(),
            ComponentId::Element(id) => &self.element(id).info,
            ComponentId::Attribute(id) => &self.attribute(id).info,
            ComponentId::Group(id) => &self.group(id).info,
            ComponentId::AttributeGroup(id) => &self.attribute_group(id).info,
        }
    }

    /// Visit the direct references of any component
    pub fn for_each_reference<'a>(&'a self, id: ComponentId, visit: &mut dyn FnMut(AnyReference<'a>)) {
        match id {
            ComponentId::Type(id) => self.type_def(id).for_each_reference(visit),
            ComponentId::Element(id) => self.element(id).for_each_reference(visit),
            ComponentId::Attribute(id) => self.attribute(id).for_each_reference(visit),
            ComponentId::Group(id) => self.group(id).for_each_reference(visit),
            ComponentId::AttributeGroup(id) => self.attribute_group(id).for_each_reference(visit),
        }
    }
}

/// Location of the pseudo-document owning the builtin components
pub const BUILTIN_LOCATION: &str = "builtin:XMLSchema";

/// A fresh arena and registry holding the ur-types and builtin datatypes
///
/// `xs:anyType` gets `TypeId::ANY_TYPE`, `xs:anySimpleType` gets
/// `TypeId::ANY_SIMPLE_TYPE` and every [`BuiltinType`] its `type_id()`.
pub fn bootstrap() -> Result<(SchemaArena, NamespaceRegistry)> {
    let registry = NamespaceRegistry::new();
    let document = registry.register_document(DocumentInfo::new(
        Location::Memory(BUILTIN_LOCATION.to_string()),
        Some(XSD_NAMESPACE.to_string()),
    ));

    let mut arena = SchemaArena::default();
    let id = arena.add_type(TypeDefinition::Complex(any_type(document)));
    registry.declare(&QName::xsd("anyType"), ComponentId::Type(id))?;
    let id = arena.add_type(TypeDefinition::Simple(any_simple_type(document)));
    registry.declare(&QName::xsd("anySimpleType"), ComponentId::Type(id))?;

    for builtin in BuiltinType::ALL {
        let id = arena.add_type(TypeDefinition::Simple(builtin.definition(document)));
        debug_assert_eq!(id, builtin.type_id());
        registry.declare(&builtin.qname(), ComponentId::Type(id))?;
    }
    Ok((arena, registry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::ResolutionState;

    #[test]
    fn test_bootstrap_ids() {
        let (arena, registry) = bootstrap().unwrap();
        assert_eq!(arena.type_count(), BuiltinType::ALL.len() + 2);
        assert_eq!(
            registry.lookup(&QName::xsd("anyType"), Category::Type).unwrap(),
            ComponentId::Type(TypeId::ANY_TYPE)
        );
        assert_eq!(
            registry.lookup(&QName::xsd("int"), Category::Type).unwrap(),
            ComponentId::Type(BuiltinType::Int.type_id())
        );
        assert!(arena
            .type_ids()
            .all(|id| arena.type_def(id).info().state.get() == ResolutionState::Resolved));
        assert!(registry.is_loaded(Some(XSD_NAMESPACE)));
    }

    #[test]
    fn test_declare_duplicate() {
        let registry = NamespaceRegistry::new();
        let name = QName::namespaced("urn:t", "T");
        registry.declare(&name, ComponentId::Type(TypeId(60))).unwrap();
        // Same component again is fine.
        registry.declare(&name, ComponentId::Type(TypeId(60))).unwrap();
        let err = registry.declare(&name, ComponentId::Type(TypeId(61))).unwrap_err();
        assert!(matches!(err, Error::DuplicateDeclaration { category: Category::Type, .. }));
        // Same name in another category is a different binding.
        registry.declare(&name, ComponentId::Element(ElementId(0))).unwrap();
        assert_eq!(registry.count(Category::Type), 1);
        assert_eq!(registry.count(Category::Element), 1);
    }

    #[test]
    fn test_lookup_missing() {
        let registry = NamespaceRegistry::new();
        let err = registry.lookup(&QName::local("nope"), Category::Group).unwrap_err();
        assert!(matches!(err, Error::UnresolvableReference { category: Category::Group, .. }));
    }

    #[test]
    fn test_visibility_through_includes() {
        let registry = NamespaceRegistry::new();
        let main = registry.register_document(DocumentInfo::new(
            Location::Memory("main.xsd".into()),
            Some("urn:main".into()),
        ));
        registry.register_import(
            main,
            ImportEdge {
                namespace: Some("urn:other".into()),
                location: None,
            },
        );
        let mut included = DocumentInfo::new(Location::Memory("part.xsd".into()), Some("urn:main".into()));
        included.included_by = Some(main);
        let part = registry.register_document(included);

        assert!(registry.is_visible(part, Some("urn:main")));
        assert!(registry.is_visible(part, Some("urn:other")));
        assert!(registry.is_visible(part, Some(XSD_NAMESPACE)));
        assert!(!registry.is_visible(part, Some("urn:stranger")));
        assert!(!registry.is_visible(part, None));

        let edges = registry.imports_of(Some("urn:other"));
        assert_eq!(edges.len(), 1);
        assert!(edges[0].location.is_none());
        assert!(!registry.is_loaded(Some("urn:other")));
        assert_eq!(registry.find_document(&Location::Memory("part.xsd".into())), Some(part));
    }
}
