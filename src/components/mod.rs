//! XML Schema components
//!
//! Every declaration and definition of a schema is stored once in the
//! [`SchemaArena`](crate::registry::SchemaArena) and addressed by a typed id.
//! Cross references are [`Reference`] cells holding the referenced name and,
//! once the resolver has bound it, the id of the target. Nothing here owns
//! another component, so recursive and mutually recursive schemas need no
//! special lifetime handling.

pub mod builtins;
pub mod elements;
pub mod facets;
pub mod groups;
pub mod types;
pub mod wildcards;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::namespaces::QName;

pub use builtins::BuiltinType;
pub use elements::{AttributeDecl, AttributeRef, AttributeUse, AttributeUseDecl, ElementDecl, ElementRef};
pub use facets::{FacetDecl, FacetKind, FacetSet, ValueSpace, WhiteSpace};
pub use groups::{
    parse_occurs, AttributeGroupDef, Compositor, ModelGroup, ModelGroupDef, Occurs, Particle, Term,
};
pub use types::{
    ComplexContentDecl, ComplexTypeDef, DerivationMethod, SimpleTypeDef, SimpleVariety, TypeDefinition,
    TypeRef,
};
pub use wildcards::{NamespaceConstraint, ProcessContents, Wildcard};

macro_rules! component_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Position of the component in its arena table
            pub fn index(self) -> usize {
                self.0 as usize
            }

            pub(crate) fn from_index(index: usize) -> Self {
                Self(index as u32)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

component_id!(
    /// Index of a simple or complex type definition
    TypeId
);
component_id!(
    /// Index of an element declaration (global or local)
    ElementId
);
component_id!(
    /// Index of an attribute declaration (global or local)
    AttributeId
);
component_id!(
    /// Index of a named model group definition
    GroupId
);
component_id!(
    /// Index of a named attribute group definition
    AttributeGroupId
);
component_id!(
    /// Index of a loaded schema document
    DocumentId
);

impl TypeId {
    /// `xs:anyType`, the root of every derivation chain
    pub const ANY_TYPE: TypeId = TypeId(0);
    /// `xs:anySimpleType`
    pub const ANY_SIMPLE_TYPE: TypeId = TypeId(1);
}

/// Component categories; names are unique per (namespace, category)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Category {
    /// Simple and complex type definitions
    Type,
    /// Element declarations
    Element,
    /// Attribute declarations
    Attribute,
    /// Model group definitions
    Group,
    /// Attribute group definitions
    AttributeGroup,
}

impl Category {
    /// All categories, in table order
    pub const ALL: [Category; 5] = [
        Category::Type,
        Category::Element,
        Category::Attribute,
        Category::Group,
        Category::AttributeGroup,
    ];

    pub(crate) fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::Type => "type",
            Category::Element => "element",
            Category::Attribute => "attribute",
            Category::Group => "group",
            Category::AttributeGroup => "attributeGroup",
        })
    }
}

/// Id of any component, tagged with its category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ComponentId {
    /// A type definition
    Type(TypeId),
    /// An element declaration
    Element(ElementId),
    /// An attribute declaration
    Attribute(AttributeId),
    /// A model group definition
    Group(GroupId),
    /// An attribute group definition
    AttributeGroup(AttributeGroupId),
}

impl ComponentId {
    /// Category of the referenced component
    pub fn category(&self) -> Category {
        match self {
            ComponentId::Type(_) => Category::Type,
            ComponentId::Element(_) => Category::Element,
            ComponentId::Attribute(_) => Category::Attribute,
            ComponentId::Group(_) => Category::Group,
            ComponentId::AttributeGroup(_) => Category::AttributeGroup,
        }
    }
}

/// Resolution progress of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum ResolutionState {
    /// Built, references not yet bound
    Unresolved = 0,
    /// Claimed by a resolver worker
    Resolving = 1,
    /// All direct references bound
    Resolved = 2,
    /// A reference could not be bound at the fixed point
    Failed = 3,
}

impl ResolutionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ResolutionState::Unresolved,
            1 => ResolutionState::Resolving,
            2 => ResolutionState::Resolved,
            _ => ResolutionState::Failed,
        }
    }
}

/// Atomic holder of a [`ResolutionState`]
///
/// `Resolved` and `Failed` are terminal: no method moves a component out of them.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    /// A cell in the `Unresolved` state
    pub fn new() -> Self {
        Self(AtomicU8::new(ResolutionState::Unresolved as u8))
    }

    /// A cell that starts `Resolved` (builtin components)
    pub fn resolved() -> Self {
        Self(AtomicU8::new(ResolutionState::Resolved as u8))
    }

    /// Current state
    pub fn get(&self) -> ResolutionState {
        ResolutionState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn transition(&self, from: ResolutionState, to: ResolutionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Claim the component for resolution; false if another worker owns it
    pub fn try_claim(&self) -> bool {
        self.transition(ResolutionState::Unresolved, ResolutionState::Resolving)
    }

    /// Finish a claimed resolution
    pub fn complete(&self) -> bool {
        self.transition(ResolutionState::Resolving, ResolutionState::Resolved)
    }

    /// Give a claimed component back to the work-set
    pub fn release(&self) -> bool {
        self.transition(ResolutionState::Resolving, ResolutionState::Unresolved)
    }

    /// Mark an unresolved component as failed
    pub fn fail(&self) -> bool {
        self.transition(ResolutionState::Unresolved, ResolutionState::Failed)
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// A named reference, bound at most once to a component id
#[derive(Debug)]
pub struct Reference<T> {
    /// The referenced qualified name
    pub name: QName,
    target: OnceCell<T>,
}

impl<T: Copy + PartialEq> Reference<T> {
    /// An unbound reference
    pub fn new(name: QName) -> Self {
        Self {
            name,
            target: OnceCell::new(),
        }
    }

    /// A reference bound at construction (builtin components)
    pub fn bound(name: QName, target: T) -> Self {
        Self {
            name,
            target: OnceCell::with_value(target),
        }
    }

    /// The bound target, if any
    pub fn get(&self) -> Option<T> {
        self.target.get().copied()
    }

    /// Bind the reference; rebinding to the same target is a no-op, to a different one fails
    pub fn bind(&self, target: T) -> bool {
        match self.target.set(target) {
            Ok(()) => true,
            Err(_) => self.get() == Some(target),
        }
    }

    /// Whether the reference has been bound
    pub fn is_bound(&self) -> bool {
        self.target.get().is_some()
    }
}

/// A borrowed reference of any category, as visited by the resolver
#[derive(Debug, Clone, Copy)]
pub enum AnyReference<'a> {
    /// Reference to a type definition
    Type(&'a Reference<TypeId>),
    /// Reference to a global element declaration
    Element(&'a Reference<ElementId>),
    /// Reference to a global attribute declaration
    Attribute(&'a Reference<AttributeId>),
    /// Reference to a model group definition
    Group(&'a Reference<GroupId>),
    /// Reference to an attribute group definition
    AttributeGroup(&'a Reference<AttributeGroupId>),
}

impl<'a> AnyReference<'a> {
    /// The referenced name
    pub fn name(&self) -> &'a QName {
        match self {
            AnyReference::Type(r) => &r.name,
            AnyReference::Element(r) => &r.name,
            AnyReference::Attribute(r) => &r.name,
            AnyReference::Group(r) => &r.name,
            AnyReference::AttributeGroup(r) => &r.name,
        }
    }

    /// Category the name must be declared in
    pub fn category(&self) -> Category {
        match self {
            AnyReference::Type(_) => Category::Type,
            AnyReference::Element(_) => Category::Element,
            AnyReference::Attribute(_) => Category::Attribute,
            AnyReference::Group(_) => Category::Group,
            AnyReference::AttributeGroup(_) => Category::AttributeGroup,
        }
    }

    /// Whether the reference is already bound
    pub fn is_bound(&self) -> bool {
        match self {
            AnyReference::Type(r) => r.is_bound(),
            AnyReference::Element(r) => r.is_bound(),
            AnyReference::Attribute(r) => r.is_bound(),
            AnyReference::Group(r) => r.is_bound(),
            AnyReference::AttributeGroup(r) => r.is_bound(),
        }
    }

    /// Bind to a component found in the registry; false on a category mismatch
    pub fn bind(&self, target: ComponentId) -> bool {
        match (self, target) {
            (AnyReference::Type(r), ComponentId::Type(id)) => r.bind(id),
            (AnyReference::Element(r), ComponentId::Element(id)) => r.bind(id),
            (AnyReference::Attribute(r), ComponentId::Attribute(id)) => r.bind(id),
            (AnyReference::Group(r), ComponentId::Group(id)) => r.bind(id),
            (AnyReference::AttributeGroup(r), ComponentId::AttributeGroup(id)) => r.bind(id),
            _ => false,
        }
    }
}

/// Components whose direct references the resolver binds
pub trait HasReferences {
    /// Visit every direct named reference of the component
    fn for_each_reference<'a>(&'a self, visit: &mut dyn FnMut(AnyReference<'a>));
}

/// Documentation and application information attached to a component
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Annotation {
    /// Text of `xs:documentation` children
    pub documentation: Vec<String>,
    /// Text of `xs:appinfo` children
    pub appinfo: Vec<String>,
}

impl Annotation {
    /// True when nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.documentation.is_empty() && self.appinfo.is_empty()
    }
}

/// Kind of a value constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueConstraintKind {
    /// `default="..."`
    Default,
    /// `fixed="..."`
    Fixed,
}

/// A default or fixed value of an element, attribute or attribute use
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueConstraint {
    /// Default or fixed
    pub kind: ValueConstraintKind,
    /// The literal value
    pub value: String,
}

impl ValueConstraint {
    /// Attribute name used in diagnostics
    pub fn keyword(&self) -> &'static str {
        match self.kind {
            ValueConstraintKind::Default => "default",
            ValueConstraintKind::Fixed => "fixed",
        }
    }

    /// Whether this is a fixed value
    pub fn is_fixed(&self) -> bool {
        self.kind == ValueConstraintKind::Fixed
    }
}

/// Fields shared by every arena component
#[derive(Debug)]
pub struct ComponentInfo {
    /// Name; None for anonymous components
    pub name: Option<QName>,
    /// Whether the name is registered in the namespace registry
    pub global: bool,
    /// Document the component was declared in
    pub document: DocumentId,
    /// Resolution progress
    pub state: StateCell,
    /// Attached annotation
    pub annotation: Option<Annotation>,
}

impl ComponentInfo {
    /// Info for a global, registered component
    pub fn global(name: QName, document: DocumentId) -> Self {
        Self {
            name: Some(name),
            global: true,
            document,
            state: StateCell::new(),
            annotation: None,
        }
    }

    /// Info for a local or anonymous component
    pub fn local(name: Option<QName>, document: DocumentId) -> Self {
        Self {
            name,
            global: false,
            document,
            state: StateCell::new(),
            annotation: None,
        }
    }
}

/// Human readable description of a component for diagnostics
pub fn describe(category: Category, info: &ComponentInfo) -> String {
    match (&info.name, info.global) {
        (Some(name), true) => format!("{} '{}'", category, name),
        (Some(name), false) => format!("local {} '{}'", category, name),
        (None, _) => format!("anonymous {}", category),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), ResolutionState::Unresolved);
        assert!(cell.try_claim());
        assert!(!cell.try_claim());
        assert_eq!(cell.get(), ResolutionState::Resolving);
        assert!(cell.release());
        assert!(cell.try_claim());
        assert!(cell.complete());
        assert_eq!(cell.get(), ResolutionState::Resolved);

        // Terminal: neither claim nor release nor fail moves it.
        assert!(!cell.try_claim());
        assert!(!cell.release());
        assert!(!cell.fail());
        assert_eq!(cell.get(), ResolutionState::Resolved);
    }

    #[test]
    fn test_reference_binds_once() {
        let r: Reference<TypeId> = Reference::new(QName::local("T"));
        assert!(!r.is_bound());
        assert!(r.bind(TypeId(4)));
        assert!(r.bind(TypeId(4)));
        assert!(!r.bind(TypeId(5)));
        assert_eq!(r.get(), Some(TypeId(4)));
    }

    #[test]
    fn test_any_reference_category_mismatch() {
        let r: Reference<ElementId> = Reference::new(QName::local("e"));
        let any = AnyReference::Element(&r);
        assert!(!any.bind(ComponentId::Type(TypeId(3))));
        assert!(any.bind(ComponentId::Element(ElementId(3))));
        assert_eq!(any.category(), Category::Element);
    }

    #[test]
    fn test_describe() {
        let info = ComponentInfo::global(QName::local("T"), DocumentId(0));
        assert_eq!(describe(Category::Type, &info), "type 'T'");
        let anon = ComponentInfo::local(None, DocumentId(0));
        assert_eq!(describe(Category::Type, &anon), "anonymous type");
    }
}
