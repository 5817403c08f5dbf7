//! Simple and complex type definitions
//!
//! These are the raw definitions as written in the schema document. The
//! effective view (derivation chain, merged facets, inherited attributes and
//! content) is computed by [`crate::derivation`].

use std::fmt;

use serde::Serialize;

use super::builtins::BuiltinType;
use super::elements::AttributeUseDecl;
use super::facets::FacetDecl;
use super::groups::Particle;
use super::wildcards::Wildcard;
use super::{AnyReference, AttributeGroupId, ComponentInfo, HasReferences, Reference, TypeId};
use crate::namespaces::QName;

/// A type used by a declaration: named (resolved later) or anonymous (inline)
#[derive(Debug)]
pub enum TypeRef {
    /// `type="..."` / `base="..."` / `itemType="..."`
    Named(Reference<TypeId>),
    /// Inline anonymous definition, already in the arena
    Anonymous(TypeId),
}

impl TypeRef {
    /// A named reference bound at construction
    pub fn builtin(name: QName, id: TypeId) -> Self {
        TypeRef::Named(Reference::bound(name, id))
    }

    /// A reference to `xs:anyType`
    pub fn any_type() -> Self {
        Self::builtin(QName::xsd("anyType"), TypeId::ANY_TYPE)
    }

    /// A reference to `xs:anySimpleType`
    pub fn any_simple_type() -> Self {
        Self::builtin(QName::xsd("anySimpleType"), TypeId::ANY_SIMPLE_TYPE)
    }

    /// The type id, once known
    pub fn get(&self) -> Option<TypeId> {
        match self {
            TypeRef::Named(r) => r.get(),
            TypeRef::Anonymous(id) => Some(*id),
        }
    }

    fn visit<'a>(&'a self, visit: &mut dyn FnMut(AnyReference<'a>)) {
        if let TypeRef::Named(r) = self {
            visit(AnyReference::Type(r));
        }
    }
}

/// How a type is derived from its base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DerivationMethod {
    /// Narrowing of the base
    Restriction,
    /// Addition to the base
    Extension,
    /// Only `xs:anyType`
    None,
}

impl fmt::Display for DerivationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Restriction => "restriction",
            Self::Extension => "extension",
            Self::None => "none",
        })
    }
}

/// The defining child of an `xs:simpleType`
#[derive(Debug)]
pub enum SimpleVariety {
    /// `xs:restriction`: same variety as the base, narrowed by facets
    Restriction {
        /// Base type
        base: TypeRef,
        /// Local facets, in document order
        facets: Vec<FacetDecl>,
    },
    /// `xs:list`
    List {
        /// Item type
        item_type: TypeRef,
    },
    /// `xs:union`
    Union {
        /// Member types, `memberTypes` first then inline definitions
        member_types: Vec<TypeRef>,
    },
}

/// XSD simple type definition
#[derive(Debug)]
pub struct SimpleTypeDef {
    /// Shared component fields
    pub info: ComponentInfo,
    /// Restriction, list or union
    pub variety: SimpleVariety,
    /// Lexical space check for builtin datatypes
    pub builtin: Option<BuiltinType>,
}

impl SimpleTypeDef {
    /// The base type reference (`xs:anySimpleType` for lists and unions)
    pub fn base(&self) -> Option<&TypeRef> {
        match &self.variety {
            SimpleVariety::Restriction { base, .. } => Some(base),
            SimpleVariety::List { .. } | SimpleVariety::Union { .. } => None,
        }
    }
}

impl HasReferences for SimpleTypeDef {
    fn for_each_reference<'a>(&'a self, visit: &mut dyn FnMut(AnyReference<'a>)) {
        match &self.variety {
            SimpleVariety::Restriction { base, .. } => base.visit(visit),
            SimpleVariety::List { item_type } => item_type.visit(visit),
            SimpleVariety::Union { member_types } => {
                for member in member_types {
                    member.visit(visit);
                }
            }
        }
    }
}

/// Content declared by a complex type
#[derive(Debug)]
pub enum ComplexContentDecl {
    /// `xs:complexContent`, or a particle directly inside `xs:complexType`
    Complex {
        /// Root particle; None for empty content
        particle: Option<Particle>,
    },
    /// `xs:simpleContent`
    Simple {
        /// Facets of a simpleContent restriction
        facets: Vec<FacetDecl>,
    },
}

/// XSD complex type definition
#[derive(Debug)]
pub struct ComplexTypeDef {
    /// Shared component fields
    pub info: ComponentInfo,
    /// Base type; None only for `xs:anyType`
    pub base: Option<TypeRef>,
    /// Restriction or extension of the base
    pub derivation: DerivationMethod,
    /// Declared content
    pub content: ComplexContentDecl,
    /// Whether character data may interleave with child elements
    pub mixed: bool,
    /// Abstract types cannot be used directly by instances
    pub is_abstract: bool,
    /// Locally declared attribute uses
    pub attributes: Vec<AttributeUseDecl>,
    /// Referenced attribute groups
    pub attribute_groups: Vec<Reference<AttributeGroupId>>,
    /// Local `xs:anyAttribute`
    pub attribute_wildcard: Option<Wildcard>,
}

impl ComplexTypeDef {
    /// A complex type restricting `xs:anyType` with empty content
    pub fn new(info: ComponentInfo) -> Self {
        Self {
            info,
            base: Some(TypeRef::any_type()),
            derivation: DerivationMethod::Restriction,
            content: ComplexContentDecl::Complex { particle: None },
            mixed: false,
            is_abstract: false,
            attributes: Vec::new(),
            attribute_groups: Vec::new(),
            attribute_wildcard: None,
        }
    }
}

impl HasReferences for ComplexTypeDef {
    fn for_each_reference<'a>(&'a self, visit: &mut dyn FnMut(AnyReference<'a>)) {
        if let Some(base) = &self.base {
            base.visit(visit);
        }
        if let ComplexContentDecl::Complex { particle: Some(particle) } = &self.content {
            particle.for_each_reference(visit);
        }
        for attribute in &self.attributes {
            attribute.for_each_reference(visit);
        }
        for group in &self.attribute_groups {
            visit(AnyReference::AttributeGroup(group));
        }
    }
}

/// A simple or complex type definition
#[derive(Debug)]
pub enum TypeDefinition {
    /// Simple type
    Simple(SimpleTypeDef),
    /// Complex type
    Complex(ComplexTypeDef),
}

impl TypeDefinition {
    /// Shared component fields
    pub fn info(&self) -> &ComponentInfo {
        match self {
            TypeDefinition::Simple(t) => &t.info,
            TypeDefinition::Complex(t) => &t.info,
        }
    }

    /// Mutable shared component fields
    pub fn info_mut(&mut self) -> &mut ComponentInfo {
        match self {
            TypeDefinition::Simple(t) => &mut t.info,
            TypeDefinition::Complex(t) => &mut t.info,
        }
    }

    /// Type name, None for anonymous types
    pub fn name(&self) -> Option<&QName> {
        self.info().name.as_ref()
    }

    /// Check if this is a simple type
    pub fn is_simple(&self) -> bool {
        matches!(self, TypeDefinition::Simple(_))
    }

    /// Check if this is a complex type
    pub fn is_complex(&self) -> bool {
        matches!(self, TypeDefinition::Complex(_))
    }

    /// Base type reference, if any
    pub fn base(&self) -> Option<&TypeRef> {
        match self {
            TypeDefinition::Simple(t) => t.base(),
            TypeDefinition::Complex(t) => t.base.as_ref(),
        }
    }
}

impl HasReferences for TypeDefinition {
    fn for_each_reference<'a>(&'a self, visit: &mut dyn FnMut(AnyReference<'a>)) {
        match self {
            TypeDefinition::Simple(t) => t.for_each_reference(visit),
            TypeDefinition::Complex(t) => t.for_each_reference(visit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::groups::{Compositor, ModelGroup, Occurs, Term};
    use crate::components::{Category, DocumentId};

    #[test]
    fn test_builtin_refs_are_bound() {
        assert_eq!(TypeRef::any_type().get(), Some(TypeId::ANY_TYPE));
        assert_eq!(TypeRef::any_simple_type().get(), Some(TypeId::ANY_SIMPLE_TYPE));
        assert_eq!(TypeRef::Named(Reference::new(QName::local("T"))).get(), None);
    }

    #[test]
    fn test_complex_type_references() {
        let mut def = ComplexTypeDef::new(ComponentInfo::global(QName::local("T"), DocumentId(0)));
        let mut group = ModelGroup::new(Compositor::Sequence);
        group.particles.push(Particle::new(
            Occurs::once(),
            Term::GroupRef(Reference::new(QName::local("G"))),
        ));
        def.content = ComplexContentDecl::Complex {
            particle: Some(Particle::new(Occurs::once(), Term::Group(group))),
        };
        def.attribute_groups.push(Reference::new(QName::local("AG")));

        let mut seen = Vec::new();
        def.for_each_reference(&mut |r| seen.push(r.category()));
        // Base (already bound to anyType), group, attribute group.
        assert_eq!(seen, vec![Category::Type, Category::Group, Category::AttributeGroup]);
    }

    #[test]
    fn test_union_references() {
        let def = SimpleTypeDef {
            info: ComponentInfo::local(None, DocumentId(0)),
            variety: SimpleVariety::Union {
                member_types: vec![
                    TypeRef::Named(Reference::new(QName::xsd("int"))),
                    TypeRef::Anonymous(TypeId(40)),
                ],
            },
            builtin: None,
        };
        let mut count = 0;
        def.for_each_reference(&mut |_| count += 1);
        assert_eq!(count, 1);
        assert!(def.base().is_none());
    }
}
