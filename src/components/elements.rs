//! Element and attribute declarations
//!
//! Reference: https://www.w3.org/TR/xmlschema-1/#cElement_Declarations

use std::fmt;

use serde::Serialize;

use super::groups::Occurs;
use super::types::TypeRef;
use super::{AnyReference, AttributeId, ComponentInfo, ElementId, HasReferences, Reference, ValueConstraint};

/// An element particle term: a local declaration or a reference to a global one
#[derive(Debug)]
pub enum ElementRef {
    /// Local declaration, owned by the enclosing type
    Local(ElementId),
    /// `ref="..."` to a global declaration
    Global(Reference<ElementId>),
}

impl ElementRef {
    /// The declaration id, once known
    pub fn get(&self) -> Option<ElementId> {
        match self {
            ElementRef::Local(id) => Some(*id),
            ElementRef::Global(r) => r.get(),
        }
    }
}

/// XSD element declaration
#[derive(Debug)]
pub struct ElementDecl {
    /// Shared component fields
    pub info: ComponentInfo,
    /// Declared type; None means the substitution head's type or `xs:anyType`
    pub type_ref: Option<TypeRef>,
    /// Substitution group head
    pub substitution_head: Option<Reference<ElementId>>,
    /// Default or fixed value
    pub value_constraint: Option<ValueConstraint>,
    /// Whether `xsi:nil` is allowed
    pub nillable: bool,
    /// Abstract elements never appear in instances themselves
    pub is_abstract: bool,
}

impl ElementDecl {
    /// Create a declaration with no type and default flags
    pub fn new(info: ComponentInfo) -> Self {
        Self {
            info,
            type_ref: None,
            substitution_head: None,
            value_constraint: None,
            nillable: false,
            is_abstract: false,
        }
    }
}

impl HasReferences for ElementDecl {
    fn for_each_reference<'a>(&'a self, visit: &mut dyn FnMut(AnyReference<'a>)) {
        if let Some(TypeRef::Named(r)) = &self.type_ref {
            visit(AnyReference::Type(r));
        }
        if let Some(head) = &self.substitution_head {
            visit(AnyReference::Element(head));
        }
    }
}

/// XSD attribute declaration
#[derive(Debug)]
pub struct AttributeDecl {
    /// Shared component fields
    pub info: ComponentInfo,
    /// Declared simple type; None means `xs:anySimpleType`
    pub type_ref: Option<TypeRef>,
    /// Default or fixed value
    pub value_constraint: Option<ValueConstraint>,
}

impl HasReferences for AttributeDecl {
    fn for_each_reference<'a>(&'a self, visit: &mut dyn FnMut(AnyReference<'a>)) {
        if let Some(TypeRef::Named(r)) = &self.type_ref {
            visit(AnyReference::Type(r));
        }
    }
}

/// A local attribute declaration or a reference to a global one
#[derive(Debug)]
pub enum AttributeRef {
    /// Local declaration
    Local(AttributeId),
    /// `ref="..."` to a global declaration
    Global(Reference<AttributeId>),
}

impl AttributeRef {
    /// The declaration id, once known
    pub fn get(&self) -> Option<AttributeId> {
        match self {
            AttributeRef::Local(id) => Some(*id),
            AttributeRef::Global(r) => r.get(),
        }
    }
}

/// The `use` of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum AttributeUse {
    /// May be absent
    #[default]
    Optional,
    /// Must be present
    Required,
    /// Must be absent; removes an inherited attribute in a restriction
    Prohibited,
}

impl AttributeUse {
    /// Parse the `use` attribute value
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "optional" => Some(Self::Optional),
            "required" => Some(Self::Required),
            "prohibited" => Some(Self::Prohibited),
            _ => None,
        }
    }

    /// Occurrence bounds equivalent to this use
    pub fn occurs(self) -> Occurs {
        match self {
            Self::Optional => Occurs::optional(),
            Self::Required => Occurs::once(),
            Self::Prohibited => Occurs::empty(),
        }
    }
}

impl fmt::Display for AttributeUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Optional => "optional",
            Self::Required => "required",
            Self::Prohibited => "prohibited",
        })
    }
}

/// An attribute use inside a complex type or attribute group
#[derive(Debug)]
pub struct AttributeUseDecl {
    /// The declaration
    pub attribute: AttributeRef,
    /// Optional / required / prohibited
    pub use_: AttributeUse,
    /// Value constraint of the use, overriding the declaration's
    pub value_constraint: Option<ValueConstraint>,
}

impl HasReferences for AttributeUseDecl {
    fn for_each_reference<'a>(&'a self, visit: &mut dyn FnMut(AnyReference<'a>)) {
        if let AttributeRef::Global(r) = &self.attribute {
            visit(AnyReference::Attribute(r));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{DocumentId, TypeId};
    use crate::namespaces::QName;

    #[test]
    fn test_attribute_use_occurs() {
        assert_eq!(AttributeUse::parse("required"), Some(AttributeUse::Required));
        assert_eq!(AttributeUse::parse("sometimes"), None);
        assert!(AttributeUse::Required
            .occurs()
            .has_occurs_restriction(&AttributeUse::Optional.occurs()));
        assert!(!AttributeUse::Optional
            .occurs()
            .has_occurs_restriction(&AttributeUse::Required.occurs()));
        assert!(AttributeUse::Prohibited
            .occurs()
            .has_occurs_restriction(&AttributeUse::Optional.occurs()));
    }

    #[test]
    fn test_element_references() {
        let mut decl = ElementDecl::new(ComponentInfo::global(QName::local("e"), DocumentId(0)));
        decl.type_ref = Some(TypeRef::Named(Reference::new(QName::local("T"))));
        decl.substitution_head = Some(Reference::new(QName::local("head")));

        let mut seen = Vec::new();
        decl.for_each_reference(&mut |r| seen.push((r.category(), r.name().local_name.clone())));
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1, "T");
        assert_eq!(seen[1].1, "head");

        // Anonymous types are separate arena components, not references.
        decl.type_ref = Some(TypeRef::Anonymous(TypeId(9)));
        decl.substitution_head = None;
        let mut count = 0;
        decl.for_each_reference(&mut |_| count += 1);
        assert_eq!(count, 0);
    }
}
