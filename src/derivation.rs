//! Type derivation engine
//!
//! Folds every type's base chain into an effective view:
//!
//! - simple types get their variety (atomic, list, union), the merged facet
//!   set and the nearest builtin used for lexical checks;
//! - complex types get their content type, the particle tree with group
//!   references expanded, the effective attribute set and attribute wildcard.
//!
//! Types are derived on demand with memoization. A type whose base chain
//! reaches itself fails with [`Error::CircularTypeDefinition`]; model groups
//! and attribute groups that contain themselves fail with
//! [`Error::CircularGroupReference`]. Element recursion through content is
//! never followed here and stays legal.
//!
//! The module also computes element types, the transitive substitution
//! groups, and checks default/fixed values against their types.

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::components::{
    describe, AttributeGroupId, AttributeId, AttributeUse, AttributeUseDecl, BuiltinType, Category,
    ComplexContentDecl, ComplexTypeDef, Compositor, DerivationMethod, ElementId, FacetDecl, FacetKind,
    FacetSet, GroupId, ModelGroup, Occurs, Particle, Reference, SimpleTypeDef, SimpleVariety, Term,
    TypeDefinition, TypeId, TypeRef, ValueConstraint, ValueSpace, Wildcard,
};
use crate::error::{Error, ValidationError, ValidationErrorKind};
use crate::namespaces::QName;
use crate::registry::SchemaArena;

/// Variety of an effective simple type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Variety {
    /// A single value
    Atomic,
    /// Whitespace-separated items of the given type
    List(TypeId),
    /// Valid if any member type accepts the value
    Union(Vec<TypeId>),
}

/// A simple type with its derivation chain folded in
#[derive(Debug, Clone)]
pub struct EffectiveSimpleType {
    /// Atomic, list or union
    pub variety: Variety,
    /// Facets merged along the restriction chain
    pub facets: FacetSet,
    /// Nearest builtin ancestor of an atomic type
    pub builtin: Option<BuiltinType>,
}

impl EffectiveSimpleType {
    fn any_simple() -> Self {
        Self {
            variety: Variety::Atomic,
            facets: FacetSet::default(),
            builtin: None,
        }
    }

    /// Value space used to order range and enumeration values
    pub fn value_space(&self) -> ValueSpace {
        match (&self.variety, self.builtin) {
            (Variety::Atomic, Some(builtin)) => builtin.value_space(),
            _ => ValueSpace::Unordered,
        }
    }
}

/// Content type of a complex type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContentTypeLabel {
    /// No children, no text
    Empty,
    /// Character data only, typed by a simple type
    Simple,
    /// Child elements only
    ElementOnly,
    /// Child elements interleaved with text
    Mixed,
}

/// A particle term with group references expanded
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedTerm {
    /// An element declaration
    Element(ElementId),
    /// An element wildcard
    Wildcard(Wildcard),
    /// A model group
    Group {
        /// Compositor
        compositor: Compositor,
        /// Child particles
        particles: Vec<ResolvedParticle>,
    },
}

/// An occurrence-bounded resolved term
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParticle {
    /// Occurrence bounds
    pub occurs: Occurs,
    /// The term
    pub term: ResolvedTerm,
}

impl ResolvedParticle {
    /// Whether the particle can only match the empty sequence
    pub fn is_empty(&self) -> bool {
        self.occurs.max == Some(0)
            || matches!(&self.term, ResolvedTerm::Group { particles, .. } if particles.iter().all(|p| p.is_empty()))
    }
}

/// An attribute use of an effective complex type
#[derive(Debug, Clone)]
pub struct EffectiveAttribute {
    /// Attribute name
    pub name: QName,
    /// The declaration
    pub attribute: AttributeId,
    /// Simple type of the value
    pub type_id: TypeId,
    /// Optional or required (prohibited uses are removed)
    pub use_: AttributeUse,
    /// Default or fixed value, the use's overriding the declaration's
    pub value_constraint: Option<ValueConstraint>,
}

/// A complex type with its derivation chain folded in
#[derive(Debug, Clone)]
pub struct EffectiveComplexType {
    /// Empty, simple, element-only or mixed
    pub label: ContentTypeLabel,
    /// Root particle; None for empty and simple content
    pub particle: Option<ResolvedParticle>,
    /// Whether text may interleave with children
    pub mixed: bool,
    /// Value type of simple content
    pub simple_content: Option<EffectiveSimpleType>,
    /// Attribute uses by name
    pub attributes: IndexMap<QName, EffectiveAttribute>,
    /// Effective `xs:anyAttribute`
    pub attribute_wildcard: Option<Wildcard>,
    /// Abstract types cannot type instances directly
    pub is_abstract: bool,
}

/// Effective view of a type
#[derive(Debug, Clone)]
pub enum EffectiveType {
    /// A simple type
    Simple(EffectiveSimpleType),
    /// A complex type
    Complex(EffectiveComplexType),
}

/// Derivation result of one type
#[derive(Debug, Clone)]
pub struct TypeInfo {
    /// Base type; None only for `xs:anyType`
    pub base: Option<TypeId>,
    /// Derivation method from the base
    pub derivation: DerivationMethod,
    /// Folded view
    pub effective: EffectiveType,
}

/// Derivation results of every type in an arena
#[derive(Debug, Default)]
pub struct DerivedTypes {
    types: Vec<Option<TypeInfo>>,
}

impl DerivedTypes {
    /// Derivation result of a type; None if its derivation failed
    pub fn get(&self, id: TypeId) -> Option<&TypeInfo> {
        self.types.get(id.index()).and_then(Option::as_ref)
    }

    /// Effective simple type of a simple type definition
    pub fn simple(&self, id: TypeId) -> Option<&EffectiveSimpleType> {
        match self.get(id).map(|info| &info.effective) {
            Some(EffectiveType::Simple(simple)) => Some(simple),
            _ => None,
        }
    }

    /// Effective complex type of a complex type definition
    pub fn complex(&self, id: TypeId) -> Option<&EffectiveComplexType> {
        match self.get(id).map(|info| &info.effective) {
            Some(EffectiveType::Complex(complex)) => Some(complex),
            _ => None,
        }
    }

    /// Value type of a simple type or of a complex type with simple content
    pub fn value_type(&self, id: TypeId) -> Option<&EffectiveSimpleType> {
        match self.get(id).map(|info| &info.effective) {
            Some(EffectiveType::Simple(simple)) => Some(simple),
            Some(EffectiveType::Complex(complex)) => complex.simple_content.as_ref(),
            None => None,
        }
    }

    /// The type and its ancestors, ending with `xs:anyType`
    pub fn chain(&self, id: TypeId) -> Vec<TypeId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(base) = self.get(current).and_then(|info| info.base) {
            if chain.contains(&base) {
                break;
            }
            chain.push(base);
            current = base;
        }
        chain
    }

    /// Whether `derived` is `base` or has it in its chain
    pub fn is_derived_from(&self, derived: TypeId, base: TypeId) -> bool {
        self.chain(derived).contains(&base)
    }

    /// Normalize and check a literal against a simple type (or simple content)
    pub fn validate_value(&self, id: TypeId, value: &str) -> Result<String, ValidationError> {
        let ty = self.value_type(id).ok_or_else(|| {
            ValidationError::new(ValidationErrorKind::UnknownComponent, format!("{} has no simple value type", id))
        })?;
        self.check_value(ty, value)
    }

    /// Normalize and check a literal against an effective simple type
    ///
    /// Returns the whitespace-normalized value on success.
    pub fn check_value(&self, ty: &EffectiveSimpleType, value: &str) -> Result<String, ValidationError> {
        let normalized = ty.facets.white_space().normalize(value);
        match &ty.variety {
            Variety::Atomic => {
                if let Some(builtin) = ty.builtin {
                    builtin.check_lexical(&normalized).map_err(|reason| {
                        ValidationError::new(ValidationErrorKind::InvalidValue, format!("Invalid value '{}'", normalized))
                            .with_reason(reason)
                    })?;
                }
                let measure = match ty.builtin {
                    Some(builtin) => builtin.length_of(&normalized),
                    None => normalized.chars().count() as u64,
                };
                ty.facets.check(&normalized, Some(measure), ty.value_space())?;
            }
            Variety::List(item) => {
                let item_type = self.simple(*item).ok_or_else(|| {
                    ValidationError::new(ValidationErrorKind::UnknownComponent, format!("{} is not derived", item))
                })?;
                let mut count = 0u64;
                for token in normalized.split_whitespace() {
                    self.check_value(item_type, token)?;
                    count += 1;
                }
                ty.facets.check(&normalized, Some(count), ValueSpace::Unordered)?;
            }
            Variety::Union(members) => {
                let mut reasons = Vec::new();
                let accepted = members.iter().any(|member| {
                    match self.simple(*member).map(|m| self.check_value(m, &normalized)) {
                        Some(Ok(_)) => true,
                        Some(Err(e)) => {
                            reasons.push(e.message);
                            false
                        }
                        None => false,
                    }
                });
                if !accepted {
                    return Err(ValidationError::new(
                        ValidationErrorKind::InvalidValue,
                        format!("'{}' is not valid for any member type of the union", normalized),
                    )
                    .with_reason(reasons.join("; ")));
                }
                ty.facets.check(&normalized, None, ValueSpace::Unordered)?;
            }
        }
        Ok(normalized)
    }
}

/// Failure of one derivation step; None when a dependency already reported it
type Step<T> = std::result::Result<T, Option<Error>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    NotStarted,
    InProgress,
    Done,
    Failed,
}

/// Memoizing deriver over a resolved arena
struct Deriver<'a> {
    arena: &'a SchemaArena,
    derived: DerivedTypes,
    status: Vec<Status>,
    stack: Vec<TypeId>,
    errors: Vec<Error>,
    reported_cycles: HashSet<BTreeSet<String>>,
}

/// Derive every type of the arena and check every named group for cycles
pub fn derive_all(arena: &SchemaArena) -> (DerivedTypes, Vec<Error>) {
    let count = arena.type_count();
    let mut deriver = Deriver {
        arena,
        derived: DerivedTypes {
            types: vec![None; count],
        },
        status: vec![Status::NotStarted; count],
        stack: Vec::new(),
        errors: Vec::new(),
        reported_cycles: HashSet::new(),
    };
    for id in arena.type_ids() {
        deriver.derive(id);
    }
    for id in arena.group_ids() {
        let mut stack = vec![id];
        if let Err(Some(e)) = deriver.expand_group(&arena.group(id).group, &mut stack) {
            deriver.report(e);
        }
    }
    for id in arena.attribute_group_ids() {
        let def = arena.attribute_group(id);
        let owner = describe(Category::AttributeGroup, &def.info);
        let mut stack = vec![id];
        if let Err(Some(e)) = deriver.flatten_attributes(
            &owner,
            &def.attributes,
            &def.attribute_groups,
            def.attribute_wildcard.as_ref(),
            &mut stack,
        ) {
            deriver.report(e);
        }
    }
    debug!(types = count, errors = deriver.errors.len(), "type derivation finished");
    (deriver.derived, deriver.errors)
}

impl<'a> Deriver<'a> {
    fn report(&mut self, error: Error) {
        if let Error::CircularGroupReference { chain, .. } = &error {
            let key: BTreeSet<String> = chain.iter().cloned().collect();
            if !self.reported_cycles.insert(key) {
                return;
            }
        }
        warn!(%error, "derivation failed");
        self.errors.push(error);
    }

    fn type_name(&self, id: TypeId) -> String {
        describe(Category::Type, self.arena.type_def(id).info())
    }

    fn short_name(&self, id: TypeId) -> String {
        match self.arena.type_def(id).name() {
            Some(name) => name.to_string(),
            None => format!("anonymous#{}", id.index()),
        }
    }

    /// Derive a type; false if it (or a dependency) failed
    fn derive(&mut self, id: TypeId) -> bool {
        match self.status[id.index()] {
            Status::Done => return true,
            Status::Failed => return false,
            Status::InProgress => {
                let start = self.stack.iter().position(|t| *t == id).unwrap_or(0);
                let mut chain: Vec<String> = self.stack[start..].iter().map(|t| self.short_name(*t)).collect();
                chain.push(self.short_name(id));
                self.report(Error::CircularTypeDefinition { chain });
                return false;
            }
            Status::NotStarted => {}
        }

        self.status[id.index()] = Status::InProgress;
        self.stack.push(id);
        let arena = self.arena;
        let result = match arena.type_def(id) {
            TypeDefinition::Simple(def) => self.derive_simple(id, def),
            TypeDefinition::Complex(def) => self.derive_complex(id, def),
        };
        self.stack.pop();

        match result {
            Ok(info) => {
                self.derived.types[id.index()] = Some(info);
                self.status[id.index()] = Status::Done;
                true
            }
            Err(error) => {
                if let Some(error) = error {
                    self.report(error);
                }
                self.status[id.index()] = Status::Failed;
                false
            }
        }
    }

    fn need(&mut self, id: TypeId) -> Step<()> {
        if self.derive(id) {
            Ok(())
        } else {
            Err(None)
        }
    }

    fn derive_simple(&mut self, id: TypeId, def: &SimpleTypeDef) -> Step<TypeInfo> {
        if id == TypeId::ANY_SIMPLE_TYPE {
            return Ok(TypeInfo {
                base: Some(TypeId::ANY_TYPE),
                derivation: DerivationMethod::Restriction,
                effective: EffectiveType::Simple(EffectiveSimpleType::any_simple()),
            });
        }
        let name = self.type_name(id);

        let effective = match &def.variety {
            SimpleVariety::Restriction { base, facets } => {
                let base_id = bound(base)?;
                self.expect_simple(base_id, &name, "restrict")?;
                self.need(base_id)?;
                let base_type = self.derived.simple(base_id).cloned().ok_or(None::<Error>)?;
                let mut effective = self.restrict(&base_type, facets, &name)?;
                if let Some(builtin) = def.builtin {
                    effective.builtin = Some(builtin);
                    effective.facets = effective
                        .facets
                        .restrict(&builtin.implied_facets(), builtin.value_space(), &name)
                        .map_err(Some)?;
                }
                return Ok(TypeInfo {
                    base: Some(base_id),
                    derivation: DerivationMethod::Restriction,
                    effective: EffectiveType::Simple(effective),
                });
            }
            SimpleVariety::List { item_type } => {
                let item = bound(item_type)?;
                self.expect_simple(item, &name, "use as list item")?;
                self.need(item)?;
                if matches!(self.derived.simple(item).map(|t| &t.variety), Some(Variety::List(_))) {
                    return Err(Some(Error::InvalidDerivation {
                        type_name: name,
                        reason: format!("list item type {} is itself a list", self.type_name(item)),
                    }));
                }
                let mut implied = vec![FacetDecl::fixed(FacetKind::WhiteSpace, "collapse")];
                if let Some(builtin) = def.builtin {
                    implied.extend(builtin.implied_facets());
                }
                EffectiveSimpleType {
                    variety: Variety::List(item),
                    facets: FacetSet::default()
                        .restrict(&implied, ValueSpace::Unordered, &name)
                        .map_err(Some)?,
                    builtin: None,
                }
            }
            SimpleVariety::Union { member_types } => {
                let mut members = Vec::with_capacity(member_types.len());
                for member in member_types {
                    let member = bound(member)?;
                    self.expect_simple(member, &name, "use as union member")?;
                    self.need(member)?;
                    members.push(member);
                }
                EffectiveSimpleType {
                    variety: Variety::Union(members),
                    facets: FacetSet::default(),
                    builtin: None,
                }
            }
        };
        Ok(TypeInfo {
            base: Some(TypeId::ANY_SIMPLE_TYPE),
            derivation: DerivationMethod::Restriction,
            effective: EffectiveType::Simple(effective),
        })
    }

    fn expect_simple(&self, id: TypeId, name: &str, action: &str) -> Step<()> {
        if self.arena.type_def(id).is_simple() {
            Ok(())
        } else {
            Err(Some(Error::InvalidDerivation {
                type_name: name.to_string(),
                reason: format!("cannot {} complex {}", action, self.type_name(id)),
            }))
        }
    }

    /// One restriction level over an effective simple type
    fn restrict(&self, base: &EffectiveSimpleType, local: &[FacetDecl], name: &str) -> Step<EffectiveSimpleType> {
        let mut facets = base.facets.restrict(local, base.value_space(), name).map_err(Some)?;

        if local.iter().any(|f| f.kind == FacetKind::Enumeration) {
            let declared = facets.enumeration.take().unwrap_or_default();
            let mut kept = Vec::with_capacity(declared.len());
            for value in declared {
                match self.derived.check_value(base, &value) {
                    Ok(_) => kept.push(value),
                    Err(e) => warn!(
                        type_name = name,
                        value = value.as_str(),
                        reason = %e,
                        "enumeration value is not valid for the base type, dropped"
                    ),
                }
            }
            facets.enumeration = Some(kept);
        }

        Ok(EffectiveSimpleType {
            variety: base.variety.clone(),
            facets,
            builtin: base.builtin,
        })
    }

    fn derive_complex(&mut self, id: TypeId, def: &ComplexTypeDef) -> Step<TypeInfo> {
        if id == TypeId::ANY_TYPE {
            return Ok(TypeInfo {
                base: None,
                derivation: DerivationMethod::None,
                effective: EffectiveType::Complex(EffectiveComplexType {
                    label: ContentTypeLabel::Mixed,
                    particle: Some(ResolvedParticle {
                        occurs: Occurs::zero_or_more(),
                        term: ResolvedTerm::Wildcard(Wildcard::any_lax()),
                    }),
                    mixed: true,
                    simple_content: None,
                    attributes: IndexMap::new(),
                    attribute_wildcard: Some(Wildcard::any_lax()),
                    is_abstract: false,
                }),
            });
        }
        let name = self.type_name(id);
        let base_id = def.base.as_ref().ok_or(None).and_then(bound)?;
        self.need(base_id)?;
        let base_info = self.derived.get(base_id).cloned().ok_or(None::<Error>)?;

        let mut stack = Vec::new();
        let (local_attributes, local_wildcard) = self.flatten_attributes(
            &name,
            &def.attributes,
            &def.attribute_groups,
            def.attribute_wildcard.as_ref(),
            &mut stack,
        )?;

        let base_complex = match &base_info.effective {
            EffectiveType::Complex(complex) => Some(complex),
            EffectiveType::Simple(_) => None,
        };
        let (attributes, attribute_wildcard) =
            self.merge_attributes(&name, def.derivation, base_complex, local_attributes, local_wildcard)?;

        let mut effective = EffectiveComplexType {
            label: ContentTypeLabel::Empty,
            particle: None,
            mixed: false,
            simple_content: None,
            attributes,
            attribute_wildcard,
            is_abstract: def.is_abstract,
        };

        match &def.content {
            ComplexContentDecl::Simple { facets } => {
                let base_simple = match &base_info.effective {
                    EffectiveType::Simple(simple) if def.derivation == DerivationMethod::Extension => simple.clone(),
                    EffectiveType::Simple(_) => {
                        return Err(Some(Error::InvalidDerivation {
                            type_name: name,
                            reason: "a simpleContent restriction needs a complex base with simple content".to_string(),
                        }));
                    }
                    EffectiveType::Complex(complex) => complex.simple_content.clone().ok_or_else(|| {
                        Some(Error::InvalidDerivation {
                            type_name: name.clone(),
                            reason: format!("base {} does not have simple content", self.type_name(base_id)),
                        })
                    })?,
                };
                let simple = match def.derivation {
                    DerivationMethod::Restriction => self.restrict(&base_simple, facets, &name)?,
                    _ => base_simple,
                };
                effective.label = ContentTypeLabel::Simple;
                effective.simple_content = Some(simple);
            }
            ComplexContentDecl::Complex { particle } => {
                let base_complex = match &base_info.effective {
                    EffectiveType::Complex(complex) if complex.label != ContentTypeLabel::Simple => complex,
                    _ => {
                        return Err(Some(Error::InvalidDerivation {
                            type_name: name,
                            reason: format!(
                                "complexContent cannot derive from {}, which has simple content",
                                self.type_name(base_id)
                            ),
                        }));
                    }
                };
                let local = match particle {
                    Some(particle) => Some(self.expand_particle(particle, &mut Vec::new())?),
                    None => None,
                };
                let (particle, mixed) = match def.derivation {
                    DerivationMethod::Extension => {
                        let particle = match (base_complex.particle.clone(), local) {
                            (Some(base), Some(local)) if !base.is_empty() && !local.is_empty() => {
                                Some(ResolvedParticle {
                                    occurs: Occurs::once(),
                                    term: ResolvedTerm::Group {
                                        compositor: Compositor::Sequence,
                                        particles: vec![base, local],
                                    },
                                })
                            }
                            (Some(base), local) if !base.is_empty() => Some(base).or(local),
                            (_, local) => local,
                        };
                        (particle, base_complex.mixed || def.mixed)
                    }
                    _ => (local, def.mixed),
                };
                let particle = particle.filter(|p| !p.is_empty());
                effective.label = match (&particle, mixed) {
                    (_, true) => ContentTypeLabel::Mixed,
                    (Some(_), false) => ContentTypeLabel::ElementOnly,
                    (None, false) => ContentTypeLabel::Empty,
                };
                effective.particle = particle;
                effective.mixed = mixed;
            }
        }

        Ok(TypeInfo {
            base: Some(base_id),
            derivation: def.derivation,
            effective: EffectiveType::Complex(effective),
        })
    }

    /// Local attribute uses and wildcard, attribute groups flattened in
    fn flatten_attributes(
        &mut self,
        owner: &str,
        uses: &[AttributeUseDecl],
        groups: &[Reference<AttributeGroupId>],
        wildcard: Option<&Wildcard>,
        stack: &mut Vec<AttributeGroupId>,
    ) -> Step<(IndexMap<QName, EffectiveAttribute>, Option<Wildcard>)> {
        let mut attributes: IndexMap<QName, EffectiveAttribute> = IndexMap::new();
        for attribute_use in uses {
            let attribute = self.attribute_use(attribute_use)?;
            if attributes.contains_key(&attribute.name) {
                return Err(Some(Error::DuplicateAttribute {
                    type_name: owner.to_string(),
                    attribute: attribute.name,
                }));
            }
            attributes.insert(attribute.name.clone(), attribute);
        }

        let mut wildcard = wildcard.cloned();
        for group in groups {
            let group_id = group.get().ok_or(None::<Error>)?;
            if let Some(start) = stack.iter().position(|g| *g == group_id) {
                let mut chain: Vec<String> = stack[start..].iter().map(|g| self.attribute_group_name(*g)).collect();
                chain.push(self.attribute_group_name(group_id));
                return Err(Some(Error::CircularGroupReference {
                    chain,
                    category: Category::AttributeGroup,
                }));
            }
            let arena = self.arena;
            let def = arena.attribute_group(group_id);
            stack.push(group_id);
            let flattened = self.flatten_attributes(
                owner,
                &def.attributes,
                &def.attribute_groups,
                def.attribute_wildcard.as_ref(),
                stack,
            );
            stack.pop();
            let (group_attributes, group_wildcard) = flattened?;

            for (name, attribute) in group_attributes {
                if attributes.contains_key(&name) {
                    return Err(Some(Error::DuplicateAttribute {
                        type_name: owner.to_string(),
                        attribute: name,
                    }));
                }
                attributes.insert(name, attribute);
            }
            wildcard = match (wildcard, group_wildcard) {
                (Some(a), Some(b)) => Some(Wildcard::new(a.constraint.intersection(&b.constraint), a.process_contents)),
                (a, b) => a.or(b),
            };
        }
        Ok((attributes, wildcard))
    }

    fn attribute_group_name(&self, id: AttributeGroupId) -> String {
        self.arena
            .attribute_group(id)
            .info
            .name
            .as_ref()
            .map_or_else(|| format!("attributeGroup#{}", id.index()), |n| n.to_string())
    }

    fn attribute_use(&mut self, attribute_use: &AttributeUseDecl) -> Step<EffectiveAttribute> {
        let arena = self.arena;
        let id = attribute_use.attribute.get().ok_or(None::<Error>)?;
        let decl = arena.attribute(id);
        let name = decl.info.name.clone().ok_or(None::<Error>)?;
        let type_id = match &decl.type_ref {
            Some(type_ref) => bound(type_ref)?,
            None => TypeId::ANY_SIMPLE_TYPE,
        };
        if !self.arena.type_def(type_id).is_simple() {
            return Err(Some(Error::InvalidDerivation {
                type_name: describe(Category::Attribute, &decl.info),
                reason: format!("attribute type {} is not a simple type", self.type_name(type_id)),
            }));
        }
        self.need(type_id)?;
        Ok(EffectiveAttribute {
            name,
            attribute: id,
            type_id,
            use_: attribute_use.use_,
            value_constraint: attribute_use
                .value_constraint
                .clone()
                .or_else(|| decl.value_constraint.clone()),
        })
    }

    fn merge_attributes(
        &self,
        name: &str,
        derivation: DerivationMethod,
        base: Option<&EffectiveComplexType>,
        local: IndexMap<QName, EffectiveAttribute>,
        local_wildcard: Option<Wildcard>,
    ) -> Step<(IndexMap<QName, EffectiveAttribute>, Option<Wildcard>)> {
        let base_attributes = base.map(|b| b.attributes.clone()).unwrap_or_default();
        let base_wildcard = base.and_then(|b| b.attribute_wildcard.clone());
        let invalid = |attribute: &QName, reason: String| {
            Some(Error::InvalidAttributeRestriction {
                type_name: name.to_string(),
                attribute: attribute.clone(),
                reason,
            })
        };

        if derivation == DerivationMethod::Extension {
            let mut attributes = base_attributes;
            for (attribute_name, attribute) in local {
                if attributes.contains_key(&attribute_name) {
                    return Err(Some(Error::DuplicateAttribute {
                        type_name: name.to_string(),
                        attribute: attribute_name,
                    }));
                }
                if attribute.use_ != AttributeUse::Prohibited {
                    attributes.insert(attribute_name, attribute);
                }
            }
            let wildcard = match (base_wildcard, local_wildcard) {
                (Some(b), Some(l)) => Some(Wildcard::new(l.constraint.union(&b.constraint), l.process_contents)),
                (b, l) => l.or(b),
            };
            return Ok((attributes, wildcard));
        }

        let mut attributes = base_attributes.clone();
        for (attribute_name, attribute) in local {
            let Some(inherited) = base_attributes.get(&attribute_name) else {
                if attribute.use_ == AttributeUse::Prohibited {
                    continue;
                }
                let admitted = base_wildcard
                    .as_ref()
                    .map_or(false, |w| w.allows(attribute_name.namespace()));
                if !admitted {
                    return Err(invalid(
                        &attribute_name,
                        "not declared by the base type nor admitted by its attribute wildcard".to_string(),
                    ));
                }
                attributes.insert(attribute_name, attribute);
                continue;
            };

            if attribute.use_ == AttributeUse::Prohibited {
                if inherited.use_ == AttributeUse::Required {
                    return Err(invalid(&attribute_name, "cannot prohibit a required attribute".to_string()));
                }
                attributes.shift_remove(&attribute_name);
                continue;
            }
            if !attribute.use_.occurs().has_occurs_restriction(&inherited.use_.occurs()) {
                return Err(invalid(
                    &attribute_name,
                    format!("use '{}' widens the inherited use '{}'", attribute.use_, inherited.use_),
                ));
            }
            if let Some(fixed) = inherited.value_constraint.as_ref().filter(|vc| vc.is_fixed()) {
                let keeps = matches!(&attribute.value_constraint, Some(vc) if vc.is_fixed() && vc.value == fixed.value);
                if !keeps {
                    return Err(invalid(
                        &attribute_name,
                        format!("must keep the inherited fixed value '{}'", fixed.value),
                    ));
                }
            }
            if !self.derived.is_derived_from(attribute.type_id, inherited.type_id) {
                return Err(invalid(
                    &attribute_name,
                    format!(
                        "type {} does not derive from the inherited {}",
                        self.type_name(attribute.type_id),
                        self.type_name(inherited.type_id)
                    ),
                ));
            }
            attributes.insert(attribute_name, attribute);
        }

        let wildcard = match (local_wildcard, base_wildcard) {
            (None, _) => None,
            (Some(local), Some(base)) if local.constraint.is_subset_of(&base.constraint) => Some(local),
            (Some(_), _) => {
                return Err(Some(Error::InvalidDerivation {
                    type_name: name.to_string(),
                    reason: "attribute wildcard is not a subset of the base type's wildcard".to_string(),
                }));
            }
        };
        Ok((attributes, wildcard))
    }

    fn expand_particle(&self, particle: &Particle, stack: &mut Vec<GroupId>) -> Step<ResolvedParticle> {
        let term = match &particle.term {
            Term::Element(element) => ResolvedTerm::Element(element.get().ok_or(None::<Error>)?),
            Term::Wildcard(wildcard) => ResolvedTerm::Wildcard(wildcard.clone()),
            Term::Group(group) => self.expand_group(group, stack)?,
            Term::GroupRef(reference) => {
                let id = reference.get().ok_or(None::<Error>)?;
                if let Some(start) = stack.iter().position(|g| *g == id) {
                    let mut chain: Vec<String> = stack[start..].iter().map(|g| self.group_name(*g)).collect();
                    chain.push(self.group_name(id));
                    return Err(Some(Error::CircularGroupReference {
                        chain,
                        category: Category::Group,
                    }));
                }
                stack.push(id);
                let term = self.expand_group(&self.arena.group(id).group, stack);
                stack.pop();
                term?
            }
        };
        Ok(ResolvedParticle {
            occurs: particle.occurs,
            term,
        })
    }

    fn expand_group(&self, group: &ModelGroup, stack: &mut Vec<GroupId>) -> Step<ResolvedTerm> {
        let particles = group
            .particles
            .iter()
            .map(|p| self.expand_particle(p, stack))
            .collect::<Step<Vec<_>>>()?;
        Ok(ResolvedTerm::Group {
            compositor: group.compositor,
            particles,
        })
    }

    fn group_name(&self, id: GroupId) -> String {
        self.arena
            .group(id)
            .info
            .name
            .as_ref()
            .map_or_else(|| format!("group#{}", id.index()), |n| n.to_string())
    }
}

fn bound(type_ref: &TypeRef) -> Step<TypeId> {
    type_ref.get().ok_or(None)
}

/// Effective type of every element declaration, indexed by element id
///
/// An element without a type takes its substitution head's type, or
/// `xs:anyType` when it has no head either.
pub fn element_types(arena: &SchemaArena) -> Vec<TypeId> {
    arena
        .element_ids()
        .map(|id| {
            let mut current = id;
            let mut visited = HashSet::new();
            loop {
                let decl = arena.element(current);
                if let Some(type_id) = decl.type_ref.as_ref().and_then(TypeRef::get) {
                    return type_id;
                }
                match decl.substitution_head.as_ref().and_then(|h| h.get()) {
                    Some(head) if visited.insert(head) => current = head,
                    _ => return TypeId::ANY_TYPE,
                }
            }
        })
        .collect()
}

/// Transitive substitution group members per head element
#[derive(Debug, Default)]
pub struct SubstitutionGroups {
    members: HashMap<ElementId, Vec<ElementId>>,
}

impl SubstitutionGroups {
    /// Every element that may substitute for `head`, the head excluded
    pub fn members(&self, head: ElementId) -> &[ElementId] {
        self.members.get(&head).map_or(&[], Vec::as_slice)
    }

    /// Heads that have at least one member
    pub fn heads(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.members.keys().copied()
    }
}

/// Close the substitution relation and check member types against their heads
///
/// Recursive chains are closed like any other relation: each element appears
/// once per head, and no error is raised for the cycle itself.
pub fn substitution_groups(
    arena: &SchemaArena,
    derived: &DerivedTypes,
    element_types: &[TypeId],
) -> (SubstitutionGroups, Vec<Error>) {
    let mut errors = Vec::new();
    let mut direct: HashMap<ElementId, Vec<ElementId>> = HashMap::new();
    for id in arena.element_ids() {
        let decl = arena.element(id);
        let Some(head) = decl.substitution_head.as_ref().and_then(|h| h.get()) else {
            continue;
        };
        let member_type = element_types[id.index()];
        let head_type = element_types[head.index()];
        if derived.get(member_type).is_some()
            && derived.get(head_type).is_some()
            && !derived.is_derived_from(member_type, head_type)
        {
            errors.push(Error::InvalidDerivation {
                type_name: describe(Category::Element, &decl.info),
                reason: format!(
                    "its type does not derive from the type of substitution head '{}'",
                    arena.element(head).info.name.as_ref().map_or_else(String::new, |n| n.to_string())
                ),
            });
        }
        direct.entry(head).or_default().push(id);
    }

    let mut members = HashMap::new();
    for head in direct.keys() {
        let mut closure = Vec::new();
        let mut visited = HashSet::from([*head]);
        let mut queue = vec![*head];
        while let Some(current) = queue.pop() {
            for member in direct.get(&current).into_iter().flatten() {
                if visited.insert(*member) {
                    closure.push(*member);
                    queue.push(*member);
                }
            }
        }
        closure.sort();
        members.insert(*head, closure);
    }
    (SubstitutionGroups { members }, errors)
}

/// Check default and fixed values of elements and attributes against their types
pub fn check_value_constraints(arena: &SchemaArena, derived: &DerivedTypes, element_types: &[TypeId]) -> Vec<Error> {
    let check = |component: String, constraint: &ValueConstraint, type_id: TypeId| {
        derived
            .validate_value(type_id, &constraint.value)
            .err()
            .map(|e| Error::InvalidValueConstraint {
                component,
                constraint: constraint.keyword(),
                value: constraint.value.clone(),
                reason: e.to_string(),
            })
    };
    let mut errors = Vec::new();

    for id in arena.element_ids() {
        let decl = arena.element(id);
        let Some(constraint) = &decl.value_constraint else { continue };
        let type_id = element_types[id.index()];
        let Some(info) = derived.get(type_id) else { continue };
        let component = describe(Category::Element, &decl.info);
        match &info.effective {
            EffectiveType::Complex(complex) if complex.simple_content.is_none() => {
                let emptiable = complex.particle.as_ref().map_or(true, |p| p.occurs.min == 0 || p.is_empty());
                if !(complex.mixed && emptiable) {
                    errors.push(Error::InvalidValueConstraint {
                        component,
                        constraint: constraint.keyword(),
                        value: constraint.value.clone(),
                        reason: "only simple or emptiable mixed content can have a value constraint".to_string(),
                    });
                }
            }
            _ => errors.extend(check(component, constraint, type_id)),
        }
    }

    for id in arena.type_ids() {
        let Some(complex) = derived.complex(id) else { continue };
        for attribute in complex.attributes.values() {
            if let Some(constraint) = &attribute.value_constraint {
                let component = format!(
                    "attribute '{}' of {}",
                    attribute.name,
                    describe(Category::Type, arena.type_def(id).info())
                );
                errors.extend(check(component, constraint, attribute.type_id));
            }
        }
    }
    errors
}
