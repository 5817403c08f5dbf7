//! Particles, model groups and group definitions
//!
//! A particle is an occurrence-bounded term; terms are element declarations,
//! wildcards, nested model groups or references to named model groups.
//!
//! Reference: https://www.w3.org/TR/xmlschema-1/#cParticles

use std::fmt;

use serde::Serialize;

use super::elements::{AttributeUseDecl, ElementRef};
use super::wildcards::Wildcard;
use super::{AnyReference, AttributeGroupId, ComponentInfo, GroupId, HasReferences, Reference};
use crate::error::{Error, Result};

/// Occurrence bounds for a particle (minOccurs, maxOccurs)
/// None for max means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Occurs {
    /// Minimum number of occurrences (default 1)
    pub min: u32,
    /// Maximum number of occurrences (None = unbounded, default 1)
    pub max: Option<u32>,
}

impl Occurs {
    /// Create new occurrence bounds
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    /// Default occurrence (1, 1)
    pub fn once() -> Self {
        Self { min: 1, max: Some(1) }
    }

    /// Optional occurrence (0, 1)
    pub fn optional() -> Self {
        Self { min: 0, max: Some(1) }
    }

    /// Zero or more (0, unbounded)
    pub fn zero_or_more() -> Self {
        Self { min: 0, max: None }
    }

    /// One or more (1, unbounded)
    pub fn one_or_more() -> Self {
        Self { min: 1, max: None }
    }

    /// Empty (0, 0)
    pub fn empty() -> Self {
        Self { min: 0, max: Some(0) }
    }

    /// Check if this particle can be empty (minOccurs == 0)
    pub fn is_emptiable(&self) -> bool {
        self.min == 0
    }

    /// Check if this particle is empty (maxOccurs == 0)
    pub fn is_empty(&self) -> bool {
        self.max == Some(0)
    }

    /// Check if particle has maxOccurs == 1
    pub fn is_single(&self) -> bool {
        self.max == Some(1)
    }

    /// Check if particle can have multiple occurrences
    pub fn is_multiple(&self) -> bool {
        !self.is_empty() && !self.is_single()
    }

    /// Check if this particle has valid occurs restriction compared to another
    pub fn has_occurs_restriction(&self, other: &Occurs) -> bool {
        if self.min < other.min {
            return false;
        }
        match (self.max, other.max) {
            (Some(0), _) | (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(b)) => a <= b,
        }
    }
}

impl Default for Occurs {
    fn default() -> Self {
        Self::once()
    }
}

impl fmt::Display for Occurs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "{{{},{}}}", self.min, max),
            None => write!(f, "{{{},unbounded}}", self.min),
        }
    }
}

/// Parse minOccurs/maxOccurs from XML attribute values
pub fn parse_occurs(min_occurs: Option<&str>, max_occurs: Option<&str>) -> Result<Occurs> {
    let invalid = |message: &str| Error::SchemaStructure {
        message: message.to_string(),
        location: None,
    };
    let mut occurs = Occurs::once();

    if let Some(min_str) = min_occurs {
        occurs.min = min_str
            .trim()
            .parse::<u32>()
            .map_err(|_| invalid("minOccurs value is not a valid non-negative integer"))?;
    }

    match max_occurs.map(str::trim) {
        Some("unbounded") => occurs.max = None,
        Some(max_str) => {
            let max = max_str.parse::<u32>().map_err(|_| {
                invalid("maxOccurs value must be a non-negative integer or 'unbounded'")
            })?;
            if occurs.min > max {
                return Err(invalid("minOccurs must be lesser or equal than maxOccurs"));
            }
            occurs.max = Some(max);
        }
        None if occurs.min > 1 => {
            return Err(invalid("minOccurs must be lesser or equal than maxOccurs"));
        }
        None => {}
    }

    Ok(occurs)
}

/// Model group compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Compositor {
    /// Children in order
    Sequence,
    /// Exactly one child
    Choice,
    /// Every child at most once, any order
    All,
}

impl Compositor {
    /// Parse from an XSD element local name
    pub fn from_local_name(name: &str) -> Option<Self> {
        match name {
            "sequence" => Some(Compositor::Sequence),
            "choice" => Some(Compositor::Choice),
            "all" => Some(Compositor::All),
            _ => None,
        }
    }
}

impl fmt::Display for Compositor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Compositor::Sequence => "sequence",
            Compositor::Choice => "choice",
            Compositor::All => "all",
        })
    }
}

/// The term of a particle
#[derive(Debug)]
pub enum Term {
    /// An element declaration (local) or reference (global)
    Element(ElementRef),
    /// An element wildcard
    Wildcard(Wildcard),
    /// A nested model group
    Group(ModelGroup),
    /// A reference to a named model group definition
    GroupRef(Reference<GroupId>),
}

/// An occurrence-bounded term
#[derive(Debug)]
pub struct Particle {
    /// Occurrence bounds
    pub occurs: Occurs,
    /// The term
    pub term: Term,
}

impl Particle {
    /// Create a particle
    pub fn new(occurs: Occurs, term: Term) -> Self {
        Self { occurs, term }
    }
}

/// A compositor over an ordered list of particles
#[derive(Debug)]
pub struct ModelGroup {
    /// Compositor
    pub compositor: Compositor,
    /// Child particles in schema order
    pub particles: Vec<Particle>,
}

impl ModelGroup {
    /// Create an empty group
    pub fn new(compositor: Compositor) -> Self {
        Self {
            compositor,
            particles: Vec::new(),
        }
    }

    /// Whether the group has no particles
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
}

impl HasReferences for ModelGroup {
    fn for_each_reference<'a>(&'a self, visit: &mut dyn FnMut(AnyReference<'a>)) {
        for particle in &self.particles {
            particle.for_each_reference(visit);
        }
    }
}

impl HasReferences for Particle {
    fn for_each_reference<'a>(&'a self, visit: &mut dyn FnMut(AnyReference<'a>)) {
        match &self.term {
            Term::Element(ElementRef::Global(r)) => visit(AnyReference::Element(r)),
            Term::Element(ElementRef::Local(_)) | Term::Wildcard(_) => {}
            Term::Group(group) => group.for_each_reference(visit),
            Term::GroupRef(r) => visit(AnyReference::Group(r)),
        }
    }
}

/// A named model group definition (`xs:group name="..."`)
#[derive(Debug)]
pub struct ModelGroupDef {
    /// Shared component fields
    pub info: ComponentInfo,
    /// The defined group
    pub group: ModelGroup,
}

impl HasReferences for ModelGroupDef {
    fn for_each_reference<'a>(&'a self, visit: &mut dyn FnMut(AnyReference<'a>)) {
        self.group.for_each_reference(visit);
    }
}

/// A named attribute group definition
#[derive(Debug)]
pub struct AttributeGroupDef {
    /// Shared component fields
    pub info: ComponentInfo,
    /// Attribute uses declared in the group
    pub attributes: Vec<AttributeUseDecl>,
    /// Nested attribute group references
    pub attribute_groups: Vec<Reference<AttributeGroupId>>,
    /// Attribute wildcard
    pub attribute_wildcard: Option<Wildcard>,
}

impl HasReferences for AttributeGroupDef {
    fn for_each_reference<'a>(&'a self, visit: &mut dyn FnMut(AnyReference<'a>)) {
        for attribute in &self.attributes {
            attribute.for_each_reference(visit);
        }
        for group in &self.attribute_groups {
            visit(AnyReference::AttributeGroup(group));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::ElementId;
    use crate::namespaces::QName;

    #[test]
    fn test_occurs_presets() {
        assert_eq!(Occurs::once(), Occurs::new(1, Some(1)));
        assert_eq!(Occurs::optional(), Occurs::new(0, Some(1)));
        assert_eq!(Occurs::zero_or_more(), Occurs::new(0, None));
        assert_eq!(Occurs::one_or_more(), Occurs::new(1, None));
        assert_eq!(Occurs::empty(), Occurs::new(0, Some(0)));
        assert_eq!(Occurs::one_or_more().to_string(), "{1,unbounded}");
    }

    #[test]
    fn test_occurs_predicates() {
        let optional = Occurs::optional();
        assert!(optional.is_emptiable());
        assert!(!optional.is_empty());
        assert!(optional.is_single());

        let unbounded = Occurs::zero_or_more();
        assert!(unbounded.is_multiple());
        assert!(Occurs::empty().is_empty());
    }

    #[test]
    fn test_occurs_restriction() {
        let base = Occurs::new(1, Some(3));
        assert!(Occurs::new(2, Some(2)).has_occurs_restriction(&base));
        assert!(!Occurs::new(0, Some(3)).has_occurs_restriction(&base));
        assert!(!Occurs::new(1, Some(5)).has_occurs_restriction(&base));
        assert!(!Occurs::new(1, None).has_occurs_restriction(&base));

        let optional_base = Occurs::optional();
        assert!(Occurs::empty().has_occurs_restriction(&optional_base));
        assert!(Occurs::once().has_occurs_restriction(&optional_base));
    }

    #[test]
    fn test_parse_occurs() {
        assert_eq!(parse_occurs(None, None).unwrap(), Occurs::once());
        assert_eq!(parse_occurs(Some("0"), Some("5")).unwrap(), Occurs::new(0, Some(5)));
        assert_eq!(
            parse_occurs(Some("1"), Some("unbounded")).unwrap(),
            Occurs::one_or_more()
        );

        assert!(parse_occurs(Some("abc"), None).is_err());
        assert!(parse_occurs(None, Some("-1")).is_err());
        assert!(parse_occurs(Some("5"), Some("3")).is_err());
        assert!(parse_occurs(Some("5"), None).is_err());
    }

    #[test]
    fn test_references_are_visited() {
        let mut group = ModelGroup::new(Compositor::Sequence);
        group.particles.push(Particle::new(
            Occurs::once(),
            Term::Element(ElementRef::Global(Reference::new(QName::local("a")))),
        ));
        group.particles.push(Particle::new(
            Occurs::once(),
            Term::Element(ElementRef::Local(ElementId(7))),
        ));
        let mut nested = ModelGroup::new(Compositor::Choice);
        nested.particles.push(Particle::new(
            Occurs::once(),
            Term::GroupRef(Reference::new(QName::local("g"))),
        ));
        group.particles.push(Particle::new(Occurs::once(), Term::Group(nested)));

        let mut names = Vec::new();
        group.for_each_reference(&mut |r| names.push(r.name().local_name.clone()));
        assert_eq!(names, vec!["a", "g"]);
    }
}
