//! Raw component builder
//!
//! Walks a parsed schema document and pushes one arena component per
//! declaration. Only locally available data is recorded: QName-valued
//! attributes become unbound [`Reference`]s and global components are declared
//! in the [`NamespaceRegistry`]. Includes are fetched and built immediately,
//! imports only record an edge that the resolver follows on demand.
//!
//! A malformed node aborts the document it belongs to with
//! [`Error::SchemaStructure`]. Duplicate declarations are collected and
//! building continues, so one run reports all of them.

use tracing::{debug, trace};

use crate::components::{
    parse_occurs, Annotation, AttributeDecl, AttributeGroupDef, AttributeGroupId, AttributeRef,
    AttributeUse, AttributeUseDecl, ComplexContentDecl, ComplexTypeDef, ComponentId, ComponentInfo,
    Compositor, DerivationMethod, DocumentId, ElementDecl, ElementId, ElementRef, FacetDecl, FacetKind,
    ModelGroup, ModelGroupDef, NamespaceConstraint, Occurs, Particle, ProcessContents, Reference,
    SimpleTypeDef, SimpleVariety, Term, TypeDefinition, TypeId, TypeRef, ValueConstraint,
    ValueConstraintKind, Wildcard,
};
use crate::documents::{Document, Element};
use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::loaders::{RetrievalRequest, SchemaRetriever};
use crate::locations::Location;
use crate::names;
use crate::namespaces::{QName, XSD_NAMESPACE};
use crate::registry::{DocumentInfo, ImportEdge, NamespaceRegistry, SchemaArena};

/// Per-document settings in effect while building its components
struct Scope {
    document: DocumentId,
    location: Location,
    target_namespace: Option<String>,
    /// No-namespace QNames map to `target_namespace` (chameleon include)
    chameleon: bool,
    element_qualified: bool,
    attribute_qualified: bool,
    depth: usize,
}

/// An attribute-related child of a complex type or attribute group
enum AttributeItem {
    Use(AttributeUseDecl),
    Group(Reference<AttributeGroupId>),
    Wildcard(Wildcard),
}

/// Builds schema documents into a shared arena and registry
pub struct SchemaBuilder<'a> {
    arena: &'a mut SchemaArena,
    registry: &'a NamespaceRegistry,
    retriever: Option<&'a dyn SchemaRetriever>,
    limits: &'a Limits,
    errors: Vec<Error>,
}

impl<'a> SchemaBuilder<'a> {
    /// Create a builder without a retriever; includes then fail to load
    pub fn new(arena: &'a mut SchemaArena, registry: &'a NamespaceRegistry, limits: &'a Limits) -> Self {
        Self {
            arena,
            registry,
            retriever: None,
            limits,
            errors: Vec::new(),
        }
    }

    /// Set the collaborator used to fetch included documents
    pub fn with_retriever(mut self, retriever: &'a dyn SchemaRetriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Build a top-level schema document
    pub fn build(&mut self, document: &Document) -> Result<DocumentId> {
        self.build_schema(document, None, 0)
    }

    /// Build a document loaded for an `xs:import` of `namespace`
    pub fn build_imported(&mut self, document: &Document, namespace: Option<&str>) -> Result<DocumentId> {
        let declared = document.root().and_then(|root| root.get_attribute("targetNamespace"));
        if declared != namespace {
            return Err(Error::ImportUnavailable {
                namespace: namespace.map(String::from),
                reason: format!(
                    "document at '{}' has target namespace '{}'",
                    document.location,
                    declared.unwrap_or("##local")
                ),
            });
        }
        self.build_schema(document, None, 1)
    }

    /// Non-fatal errors collected so far
    pub fn take_errors(&mut self) -> Vec<Error> {
        std::mem::take(&mut self.errors)
    }

    fn build_schema(
        &mut self,
        document: &Document,
        includer: Option<(DocumentId, Option<String>)>,
        depth: usize,
    ) -> Result<DocumentId> {
        let location = document.location.as_string();
        let root = document
            .root()
            .ok_or_else(|| Error::structure("empty schema document", location.clone()))?;
        if root.namespace() != Some(XSD_NAMESPACE) || root.local_name() != "schema" {
            return Err(Error::structure(
                format!("expected xs:schema root element, found '{}'", root.qname),
                location,
            ));
        }

        let declared = match root.get_attribute("targetNamespace") {
            Some("") => {
                return Err(Error::structure("targetNamespace must not be empty", location));
            }
            declared => declared.map(String::from),
        };
        let (target_namespace, chameleon) = match includer {
            None => (declared, false),
            Some((_, ref parent)) => match declared {
                None => (parent.clone(), parent.is_some()),
                Some(ns) if Some(&ns) == parent.as_ref() => (Some(ns), false),
                Some(ns) => {
                    return Err(Error::structure(
                        format!(
                            "included schema has targetNamespace '{}', expected '{}'",
                            ns,
                            parent.as_deref().unwrap_or("##local")
                        ),
                        location,
                    ));
                }
            },
        };

        let element_qualified = self.form(root, "elementFormDefault", &location)?;
        let attribute_qualified = self.form(root, "attributeFormDefault", &location)?;

        let mut info = DocumentInfo::new(document.location.clone(), target_namespace.clone());
        info.included_by = includer.map(|(id, _)| id);
        let id = self.registry.register_document(info);
        debug!(
            location = %document.location,
            namespace = target_namespace.as_deref().unwrap_or("##local"),
            chameleon,
            "building schema document"
        );

        let scope = Scope {
            document: id,
            location: document.location.clone(),
            target_namespace,
            chameleon,
            element_qualified,
            attribute_qualified,
            depth,
        };
        for child in root.children() {
            self.top_level(child, &scope)?;
            self.limits.check_schema_components(self.arena.len())?;
        }
        debug!(location = %document.location, components = self.arena.len(), "schema document built");
        Ok(id)
    }

    fn form(&self, root: &Element, attribute: &str, location: &str) -> Result<bool> {
        match root.get_attribute(attribute) {
            None | Some("unqualified") => Ok(false),
            Some("qualified") => Ok(true),
            Some(other) => Err(Error::structure(
                format!("invalid value '{}' for attribute '{}'", other, attribute),
                location,
            )),
        }
    }

    fn top_level(&mut self, elem: &Element, scope: &Scope) -> Result<()> {
        self.expect_xsd(elem, scope)?;
        match elem.local_name() {
            "annotation" => Ok(()),
            "notation" => {
                trace!(name = elem.get_attribute("name"), "ignoring notation");
                Ok(())
            }
            "include" => self.include(elem, scope),
            "import" => self.import(elem, scope),
            "redefine" => Err(self.error(elem, scope, "xs:redefine is not supported")),
            "element" => self.global_element(elem, scope).map(|_| ()),
            "simpleType" => {
                let name = self.global_name(elem, scope)?;
                let id = self.simple_type(elem, scope, Some(name.clone()))?;
                self.declare(name, ComponentId::Type(id));
                Ok(())
            }
            "complexType" => {
                let name = self.global_name(elem, scope)?;
                let id = self.complex_type(elem, scope, Some(name.clone()))?;
                self.declare(name, ComponentId::Type(id));
                Ok(())
            }
            "attribute" => self.global_attribute(elem, scope),
            "attributeGroup" => self.global_attribute_group(elem, scope),
            "group" => self.global_group(elem, scope),
            other => Err(self.error(elem, scope, format!("unexpected top-level element 'xs:{}'", other))),
        }
    }

    fn include(&mut self, elem: &Element, scope: &Scope) -> Result<()> {
        let hint = elem
            .get_attribute("schemaLocation")
            .ok_or_else(|| self.error(elem, scope, "xs:include requires a 'schemaLocation'"))?;
        let location = scope.location.join(hint);
        if self.registry.find_document(&location).is_some() {
            trace!(%location, "include already loaded");
            return Ok(());
        }
        self.limits.check_schema_depth(scope.depth + 1)?;

        let Some(retriever) = self.retriever else {
            self.errors.push(Error::Retrieval(format!(
                "cannot include '{}': no retriever configured",
                location
            )));
            return Ok(());
        };
        match retriever.fetch(&RetrievalRequest::Location(location.clone())) {
            Ok(mut included) => {
                included.location = location;
                let includer = Some((scope.document, scope.target_namespace.clone()));
                if let Err(e) = self.build_schema(&included, includer, scope.depth + 1) {
                    self.errors.push(e);
                }
            }
            Err(e) => self
                .errors
                .push(Error::Retrieval(format!("cannot include '{}': {}", location, e))),
        }
        Ok(())
    }

    fn import(&mut self, elem: &Element, scope: &Scope) -> Result<()> {
        let namespace = elem.get_attribute("namespace").map(String::from);
        if namespace == scope.target_namespace {
            return Err(self.error(
                elem,
                scope,
                "xs:import must not name the document's own target namespace",
            ));
        }
        let location = elem.get_attribute("schemaLocation").map(|hint| scope.location.join(hint));
        trace!(namespace = namespace.as_deref().unwrap_or("##local"), "recording import");
        self.registry
            .register_import(scope.document, ImportEdge { namespace, location });
        Ok(())
    }

    fn global_element(&mut self, elem: &Element, scope: &Scope) -> Result<ElementId> {
        self.forbid(elem, scope, &["ref", "minOccurs", "maxOccurs", "form"], "a global element")?;
        let name = self.global_name(elem, scope)?;
        let mut decl = ElementDecl::new(ComponentInfo::global(name.clone(), scope.document));
        self.fill_element(&mut decl, elem, scope)?;
        if let Some(head) = elem.get_attribute("substitutionGroup") {
            decl.substitution_head = Some(Reference::new(self.resolve_qname(elem, head, scope)?));
        }
        decl.is_abstract = self.parse_bool(elem, "abstract", scope)?.unwrap_or(false);

        let id = self.arena.add_element(decl);
        self.declare(name, ComponentId::Element(id));
        Ok(id)
    }

    /// Type, value constraint, nillable and annotation of an element declaration
    fn fill_element(&mut self, decl: &mut ElementDecl, elem: &Element, scope: &Scope) -> Result<()> {
        let mut inline = None;
        for child in elem.children() {
            self.expect_xsd(child, scope)?;
            match child.local_name() {
                "annotation" => decl.info.annotation = Some(annotation(child)),
                "simpleType" | "complexType" if inline.is_some() => {
                    return Err(self.error(elem, scope, "element declares more than one inline type"));
                }
                "simpleType" => inline = Some(self.anonymous_simple_type(child, scope)?),
                "complexType" => inline = Some(self.anonymous_complex_type(child, scope)?),
                "unique" | "key" | "keyref" => {
                    trace!(constraint = child.local_name(), "ignoring identity constraint");
                }
                other => {
                    return Err(self.error(child, scope, format!("unexpected child 'xs:{}' of xs:element", other)));
                }
            }
        }
        decl.type_ref = match (elem.get_attribute("type"), inline) {
            (Some(_), Some(_)) => {
                return Err(self.error(elem, scope, "element has both a 'type' attribute and an inline type"));
            }
            (Some(name), None) => Some(self.type_ref(elem, name, scope)?),
            (None, Some(id)) => Some(TypeRef::Anonymous(id)),
            (None, None) => None,
        };
        decl.value_constraint = self.value_constraint(elem, scope)?;
        decl.nillable = self.parse_bool(elem, "nillable", scope)?.unwrap_or(false);
        Ok(())
    }

    fn element_particle(&mut self, elem: &Element, scope: &Scope) -> Result<Particle> {
        let occurs = self.occurs(elem, scope)?;
        if let Some(reference) = elem.get_attribute("ref") {
            self.forbid(
                elem,
                scope,
                &["name", "type", "nillable", "default", "fixed", "form", "block"],
                "an element reference",
            )?;
            if elem.children().any(|c| c.local_name() != "annotation") {
                return Err(self.error(elem, scope, "an element reference cannot have an inline type"));
            }
            let name = self.resolve_qname(elem, reference, scope)?;
            return Ok(Particle::new(occurs, Term::Element(ElementRef::Global(Reference::new(name)))));
        }

        self.forbid(elem, scope, &["substitutionGroup", "abstract", "final"], "a local element")?;
        let local_name = self.ncname(elem, scope)?;
        let qualified = match elem.get_attribute("form") {
            None => scope.element_qualified,
            Some("qualified") => true,
            Some("unqualified") => false,
            Some(other) => return Err(self.error(elem, scope, format!("invalid form '{}'", other))),
        };
        let namespace = if qualified { scope.target_namespace.clone() } else { None };
        let mut decl = ElementDecl::new(ComponentInfo::local(
            Some(QName::new(namespace, local_name)),
            scope.document,
        ));
        self.fill_element(&mut decl, elem, scope)?;
        let id = self.arena.add_element(decl);
        Ok(Particle::new(occurs, Term::Element(ElementRef::Local(id))))
    }

    fn anonymous_simple_type(&mut self, elem: &Element, scope: &Scope) -> Result<TypeId> {
        if elem.get_attribute("name").is_some() {
            return Err(self.error(elem, scope, "an anonymous type must not have a 'name'"));
        }
        self.simple_type(elem, scope, None)
    }

    fn anonymous_complex_type(&mut self, elem: &Element, scope: &Scope) -> Result<TypeId> {
        if elem.get_attribute("name").is_some() {
            return Err(self.error(elem, scope, "an anonymous type must not have a 'name'"));
        }
        self.complex_type(elem, scope, None)
    }

    fn simple_type(&mut self, elem: &Element, scope: &Scope, name: Option<QName>) -> Result<TypeId> {
        let mut info = self.info(name, scope);
        let mut variety = None;
        for child in elem.children() {
            self.expect_xsd(child, scope)?;
            match child.local_name() {
                "annotation" => info.annotation = Some(annotation(child)),
                "restriction" | "list" | "union" if variety.is_some() => {
                    return Err(self.error(
                        elem,
                        scope,
                        "simpleType must have exactly one of restriction, list or union",
                    ));
                }
                "restriction" | "list" | "union" => variety = Some(self.simple_variety(child, scope)?),
                other => {
                    return Err(self.error(child, scope, format!("unexpected child 'xs:{}' of xs:simpleType", other)));
                }
            }
        }
        let variety = variety.ok_or_else(|| {
            self.error(elem, scope, "simpleType must have exactly one of restriction, list or union")
        })?;
        Ok(self.arena.add_type(TypeDefinition::Simple(SimpleTypeDef {
            info,
            variety,
            builtin: None,
        })))
    }

    fn simple_variety(&mut self, elem: &Element, scope: &Scope) -> Result<SimpleVariety> {
        match elem.local_name() {
            "restriction" => {
                let mut base = match elem.get_attribute("base") {
                    Some(name) => Some(self.type_ref(elem, name, scope)?),
                    None => None,
                };
                let mut facets = Vec::new();
                for child in elem.children() {
                    self.expect_xsd(child, scope)?;
                    match child.local_name() {
                        "annotation" => {}
                        "simpleType" if base.is_some() => {
                            return Err(self.error(elem, scope, "restriction has both a 'base' and an inline base type"));
                        }
                        "simpleType" => base = Some(TypeRef::Anonymous(self.anonymous_simple_type(child, scope)?)),
                        other => match FacetKind::from_local_name(other) {
                            Some(kind) => facets.push(self.facet(child, kind, scope)?),
                            None => {
                                return Err(self.error(child, scope, format!("unexpected child 'xs:{}' of xs:restriction", other)));
                            }
                        },
                    }
                }
                let base = base.ok_or_else(|| {
                    self.error(elem, scope, "restriction requires a 'base' or an inline base type")
                })?;
                Ok(SimpleVariety::Restriction { base, facets })
            }
            "list" => {
                let mut item_type = match elem.get_attribute("itemType") {
                    Some(name) => Some(self.type_ref(elem, name, scope)?),
                    None => None,
                };
                for child in elem.children() {
                    self.expect_xsd(child, scope)?;
                    match child.local_name() {
                        "annotation" => {}
                        "simpleType" if item_type.is_none() => {
                            item_type = Some(TypeRef::Anonymous(self.anonymous_simple_type(child, scope)?));
                        }
                        _ => return Err(self.error(elem, scope, "list requires exactly one item type")),
                    }
                }
                let item_type = item_type.ok_or_else(|| self.error(elem, scope, "list requires exactly one item type"))?;
                Ok(SimpleVariety::List { item_type })
            }
            _ => {
                let mut member_types = Vec::new();
                if let Some(names) = elem.get_attribute("memberTypes") {
                    for name in names.split_whitespace() {
                        member_types.push(self.type_ref(elem, name, scope)?);
                    }
                }
                for child in elem.children() {
                    self.expect_xsd(child, scope)?;
                    match child.local_name() {
                        "annotation" => {}
                        "simpleType" => member_types.push(TypeRef::Anonymous(self.anonymous_simple_type(child, scope)?)),
                        other => {
                            return Err(self.error(child, scope, format!("unexpected child 'xs:{}' of xs:union", other)));
                        }
                    }
                }
                if member_types.is_empty() {
                    return Err(self.error(elem, scope, "union requires at least one member type"));
                }
                Ok(SimpleVariety::Union { member_types })
            }
        }
    }

    fn facet(&self, elem: &Element, kind: FacetKind, scope: &Scope) -> Result<FacetDecl> {
        let value = elem
            .get_attribute("value")
            .ok_or_else(|| self.error(elem, scope, format!("facet '{}' requires a 'value'", kind)))?;
        let mut facet = FacetDecl::new(kind, value);
        facet.fixed = self.parse_bool(elem, "fixed", scope)?.unwrap_or(false);
        Ok(facet)
    }

    fn complex_type(&mut self, elem: &Element, scope: &Scope, name: Option<QName>) -> Result<TypeId> {
        let mut def = ComplexTypeDef::new(self.info(name, scope));
        def.mixed = self.parse_bool(elem, "mixed", scope)?.unwrap_or(false);
        def.is_abstract = self.parse_bool(elem, "abstract", scope)?.unwrap_or(false);

        let mut content_models = 0;
        let mut derived = false;
        for child in elem.children() {
            self.expect_xsd(child, scope)?;
            match child.local_name() {
                "annotation" => def.info.annotation = Some(annotation(child)),
                kind @ ("simpleContent" | "complexContent" | "sequence" | "choice" | "all" | "group") => {
                    content_models += 1;
                    if content_models > 1 {
                        return Err(self.error(elem, scope, "complexType contains more than one content model"));
                    }
                    match kind {
                        "simpleContent" => {
                            derived = true;
                            self.simple_content(&mut def, child, scope)?;
                        }
                        "complexContent" => {
                            derived = true;
                            self.complex_content(&mut def, child, scope)?;
                        }
                        _ => {
                            def.content = ComplexContentDecl::Complex {
                                particle: Some(self.particle(child, scope, true)?),
                            };
                        }
                    }
                }
                "attribute" | "attributeGroup" | "anyAttribute" if derived => {
                    return Err(self.error(
                        child,
                        scope,
                        "attributes of a derived complexType belong inside its restriction or extension",
                    ));
                }
                "attribute" | "attributeGroup" | "anyAttribute" => {
                    let item = self.attribute_item(child, scope)?;
                    self.push_attribute_item(&mut def, item, child, scope)?;
                }
                other => {
                    return Err(self.error(child, scope, format!("unexpected child 'xs:{}' of xs:complexType", other)));
                }
            }
        }
        Ok(self.arena.add_type(TypeDefinition::Complex(def)))
    }

    /// The single restriction or extension child of simple/complexContent
    fn derivation<'e>(&self, elem: &'e Element, scope: &Scope) -> Result<(&'e Element, DerivationMethod)> {
        let mut found = None;
        for child in elem.children() {
            self.expect_xsd(child, scope)?;
            let method = match child.local_name() {
                "annotation" => continue,
                "restriction" => DerivationMethod::Restriction,
                "extension" => DerivationMethod::Extension,
                other => {
                    return Err(self.error(child, scope, format!("unexpected child 'xs:{}' of xs:{}", other, elem.local_name())));
                }
            };
            if found.is_some() {
                return Err(self.error(elem, scope, format!("xs:{} must have exactly one derivation", elem.local_name())));
            }
            found = Some((child, method));
        }
        found.ok_or_else(|| {
            self.error(elem, scope, format!("xs:{} requires a restriction or extension", elem.local_name()))
        })
    }

    fn simple_content(&mut self, def: &mut ComplexTypeDef, elem: &Element, scope: &Scope) -> Result<()> {
        let (derivation, method) = self.derivation(elem, scope)?;
        let base = derivation
            .get_attribute("base")
            .ok_or_else(|| self.error(derivation, scope, "simpleContent derivation requires a 'base'"))?;
        def.base = Some(self.type_ref(derivation, base, scope)?);
        def.derivation = method;

        let mut facets = Vec::new();
        for child in derivation.children() {
            self.expect_xsd(child, scope)?;
            match child.local_name() {
                "annotation" => {}
                "attribute" | "attributeGroup" | "anyAttribute" => {
                    let item = self.attribute_item(child, scope)?;
                    self.push_attribute_item(def, item, child, scope)?;
                }
                "simpleType" if method == DerivationMethod::Restriction => {
                    return Err(self.error(child, scope, "inline simpleType in a simpleContent restriction is not supported"));
                }
                other => match FacetKind::from_local_name(other) {
                    Some(kind) if method == DerivationMethod::Restriction => {
                        facets.push(self.facet(child, kind, scope)?);
                    }
                    _ => {
                        return Err(self.error(child, scope, format!("unexpected child 'xs:{}' of a simpleContent derivation", other)));
                    }
                },
            }
        }
        def.content = ComplexContentDecl::Simple { facets };
        Ok(())
    }

    fn complex_content(&mut self, def: &mut ComplexTypeDef, elem: &Element, scope: &Scope) -> Result<()> {
        if let Some(mixed) = self.parse_bool(elem, "mixed", scope)? {
            def.mixed = mixed;
        }
        let (derivation, method) = self.derivation(elem, scope)?;
        let base = derivation
            .get_attribute("base")
            .ok_or_else(|| self.error(derivation, scope, "complexContent derivation requires a 'base'"))?;
        def.base = Some(self.type_ref(derivation, base, scope)?);
        def.derivation = method;

        let mut particle = None;
        for child in derivation.children() {
            self.expect_xsd(child, scope)?;
            match child.local_name() {
                "annotation" => {}
                "sequence" | "choice" | "all" | "group" if particle.is_some() => {
                    return Err(self.error(derivation, scope, "complexContent derivation contains more than one content model"));
                }
                "sequence" | "choice" | "all" | "group" => particle = Some(self.particle(child, scope, true)?),
                "attribute" | "attributeGroup" | "anyAttribute" => {
                    let item = self.attribute_item(child, scope)?;
                    self.push_attribute_item(def, item, child, scope)?;
                }
                other => {
                    return Err(self.error(child, scope, format!("unexpected child 'xs:{}' of a complexContent derivation", other)));
                }
            }
        }
        def.content = ComplexContentDecl::Complex { particle };
        Ok(())
    }

    fn particle(&mut self, elem: &Element, scope: &Scope, top_level: bool) -> Result<Particle> {
        match elem.local_name() {
            "element" => self.element_particle(elem, scope),
            "any" => {
                let occurs = self.occurs(elem, scope)?;
                self.annotation_only(elem, scope)?;
                Ok(Particle::new(occurs, Term::Wildcard(self.wildcard(elem, scope)?)))
            }
            "group" => {
                let reference = elem
                    .get_attribute("ref")
                    .ok_or_else(|| self.error(elem, scope, "a local xs:group requires a 'ref'"))?;
                self.forbid(elem, scope, &["name"], "a group reference")?;
                self.annotation_only(elem, scope)?;
                let occurs = self.occurs(elem, scope)?;
                let name = self.resolve_qname(elem, reference, scope)?;
                Ok(Particle::new(occurs, Term::GroupRef(Reference::new(name))))
            }
            "sequence" | "choice" | "all" => {
                let occurs = self.occurs(elem, scope)?;
                let group = self.model_group(elem, scope, top_level)?;
                if group.compositor == Compositor::All && (occurs.min > 1 || occurs.max != Some(1)) {
                    return Err(self.error(elem, scope, "an 'all' group must have minOccurs 0 or 1 and maxOccurs 1"));
                }
                Ok(Particle::new(occurs, Term::Group(group)))
            }
            other => Err(self.error(elem, scope, format!("unexpected particle 'xs:{}'", other))),
        }
    }

    fn model_group(&mut self, elem: &Element, scope: &Scope, top_level: bool) -> Result<ModelGroup> {
        let compositor = Compositor::from_local_name(elem.local_name())
            .ok_or_else(|| self.error(elem, scope, "expected sequence, choice or all"))?;
        if compositor == Compositor::All && !top_level {
            return Err(self.error(elem, scope, "an 'all' group must be the top-level particle of a content model"));
        }
        let mut group = ModelGroup::new(compositor);
        for child in elem.children() {
            self.expect_xsd(child, scope)?;
            match child.local_name() {
                "annotation" => {}
                "element" => {
                    let particle = self.element_particle(child, scope)?;
                    if compositor == Compositor::All && particle.occurs.max.map_or(true, |max| max > 1) {
                        return Err(self.error(child, scope, "elements of an 'all' group must have maxOccurs 0 or 1"));
                    }
                    group.particles.push(particle);
                }
                "all" => {
                    return Err(self.error(child, scope, "an 'all' group must be the top-level particle of a content model"));
                }
                "any" | "group" | "sequence" | "choice" if compositor != Compositor::All => {
                    group.particles.push(self.particle(child, scope, false)?);
                }
                other => {
                    return Err(self.error(child, scope, format!("unexpected child 'xs:{}' of xs:{}", other, compositor)));
                }
            }
        }
        Ok(group)
    }

    fn global_group(&mut self, elem: &Element, scope: &Scope) -> Result<()> {
        self.forbid(elem, scope, &["ref", "minOccurs", "maxOccurs"], "a group definition")?;
        let name = self.global_name(elem, scope)?;
        let mut info = ComponentInfo::global(name.clone(), scope.document);
        let mut group = None;
        for child in elem.children() {
            self.expect_xsd(child, scope)?;
            match child.local_name() {
                "annotation" => info.annotation = Some(annotation(child)),
                "sequence" | "choice" | "all" if group.is_none() => {
                    self.forbid(child, scope, &["minOccurs", "maxOccurs"], "the compositor of a group definition")?;
                    group = Some(self.model_group(child, scope, true)?);
                }
                _ => {
                    return Err(self.error(elem, scope, "a group definition must contain exactly one sequence, choice or all"));
                }
            }
        }
        let group = group.ok_or_else(|| {
            self.error(elem, scope, "a group definition must contain exactly one sequence, choice or all")
        })?;
        let id = self.arena.add_group(ModelGroupDef { info, group });
        self.declare(name, ComponentId::Group(id));
        Ok(())
    }

    fn global_attribute(&mut self, elem: &Element, scope: &Scope) -> Result<()> {
        self.forbid(elem, scope, &["ref", "use", "form"], "a global attribute")?;
        let name = self.global_name(elem, scope)?;
        let decl = self.attribute_decl(elem, scope, ComponentInfo::global(name.clone(), scope.document))?;
        let id = self.arena.add_attribute(decl);
        self.declare(name, ComponentId::Attribute(id));
        Ok(())
    }

    fn attribute_decl(&mut self, elem: &Element, scope: &Scope, mut info: ComponentInfo) -> Result<AttributeDecl> {
        let mut inline = None;
        for child in elem.children() {
            self.expect_xsd(child, scope)?;
            match child.local_name() {
                "annotation" => info.annotation = Some(annotation(child)),
                "simpleType" if inline.is_none() => inline = Some(self.anonymous_simple_type(child, scope)?),
                other => {
                    return Err(self.error(child, scope, format!("unexpected child 'xs:{}' of xs:attribute", other)));
                }
            }
        }
        let type_ref = match (elem.get_attribute("type"), inline) {
            (Some(_), Some(_)) => {
                return Err(self.error(elem, scope, "attribute has both a 'type' attribute and an inline type"));
            }
            (Some(name), None) => Some(self.type_ref(elem, name, scope)?),
            (None, Some(id)) => Some(TypeRef::Anonymous(id)),
            (None, None) => None,
        };
        Ok(AttributeDecl {
            info,
            type_ref,
            value_constraint: self.value_constraint(elem, scope)?,
        })
    }

    fn global_attribute_group(&mut self, elem: &Element, scope: &Scope) -> Result<()> {
        self.forbid(elem, scope, &["ref"], "an attribute group definition")?;
        let name = self.global_name(elem, scope)?;
        let mut def = AttributeGroupDef {
            info: ComponentInfo::global(name.clone(), scope.document),
            attributes: Vec::new(),
            attribute_groups: Vec::new(),
            attribute_wildcard: None,
        };
        for child in elem.children() {
            self.expect_xsd(child, scope)?;
            match child.local_name() {
                "annotation" => def.info.annotation = Some(annotation(child)),
                "attribute" | "attributeGroup" | "anyAttribute" => {
                    if def.attribute_wildcard.is_some() {
                        return Err(self.error(child, scope, "xs:anyAttribute must be the last attribute declaration"));
                    }
                    match self.attribute_item(child, scope)? {
                        AttributeItem::Use(attribute) => def.attributes.push(attribute),
                        AttributeItem::Group(group) => def.attribute_groups.push(group),
                        AttributeItem::Wildcard(wildcard) => def.attribute_wildcard = Some(wildcard),
                    }
                }
                other => {
                    return Err(self.error(child, scope, format!("unexpected child 'xs:{}' of xs:attributeGroup", other)));
                }
            }
        }
        let id = self.arena.add_attribute_group(def);
        self.declare(name, ComponentId::AttributeGroup(id));
        Ok(())
    }

    fn push_attribute_item(
        &self,
        def: &mut ComplexTypeDef,
        item: AttributeItem,
        elem: &Element,
        scope: &Scope,
    ) -> Result<()> {
        if def.attribute_wildcard.is_some() {
            return Err(self.error(elem, scope, "xs:anyAttribute must be the last attribute declaration"));
        }
        match item {
            AttributeItem::Use(attribute) => def.attributes.push(attribute),
            AttributeItem::Group(group) => def.attribute_groups.push(group),
            AttributeItem::Wildcard(wildcard) => def.attribute_wildcard = Some(wildcard),
        }
        Ok(())
    }

    fn attribute_item(&mut self, elem: &Element, scope: &Scope) -> Result<AttributeItem> {
        match elem.local_name() {
            "attributeGroup" => {
                let reference = elem
                    .get_attribute("ref")
                    .ok_or_else(|| self.error(elem, scope, "a local xs:attributeGroup requires a 'ref'"))?;
                self.annotation_only(elem, scope)?;
                Ok(AttributeItem::Group(Reference::new(self.resolve_qname(elem, reference, scope)?)))
            }
            "anyAttribute" => {
                self.annotation_only(elem, scope)?;
                Ok(AttributeItem::Wildcard(self.wildcard(elem, scope)?))
            }
            _ => {
                let use_ = match elem.get_attribute("use") {
                    None => AttributeUse::Optional,
                    Some(value) => AttributeUse::parse(value)
                        .ok_or_else(|| self.error(elem, scope, format!("invalid use '{}'", value)))?,
                };
                let value_constraint = self.value_constraint(elem, scope)?;
                if let Some(vc) = &value_constraint {
                    if vc.kind == ValueConstraintKind::Default && use_ != AttributeUse::Optional {
                        return Err(self.error(elem, scope, "an attribute with a 'default' must have use=\"optional\""));
                    }
                }

                if let Some(reference) = elem.get_attribute("ref") {
                    self.forbid(elem, scope, &["name", "type", "form"], "an attribute reference")?;
                    self.annotation_only(elem, scope)?;
                    let name = self.resolve_qname(elem, reference, scope)?;
                    return Ok(AttributeItem::Use(AttributeUseDecl {
                        attribute: AttributeRef::Global(Reference::new(name)),
                        use_,
                        value_constraint,
                    }));
                }

                let local_name = self.ncname(elem, scope)?;
                let qualified = match elem.get_attribute("form") {
                    None => scope.attribute_qualified,
                    Some("qualified") => true,
                    Some("unqualified") => false,
                    Some(other) => return Err(self.error(elem, scope, format!("invalid form '{}'", other))),
                };
                let namespace = if qualified { scope.target_namespace.clone() } else { None };
                let info = ComponentInfo::local(Some(QName::new(namespace, local_name)), scope.document);
                let decl = self.attribute_decl(elem, scope, info)?;
                let id = self.arena.add_attribute(decl);
                Ok(AttributeItem::Use(AttributeUseDecl {
                    attribute: AttributeRef::Local(id),
                    use_,
                    value_constraint: None,
                }))
            }
        }
    }

    fn wildcard(&self, elem: &Element, scope: &Scope) -> Result<Wildcard> {
        let constraint = NamespaceConstraint::parse(
            elem.get_attribute("namespace").unwrap_or("##any"),
            scope.target_namespace.as_deref(),
        )
        .map_err(|e| self.relocate(e, elem, scope))?;
        let process_contents = match elem.get_attribute("processContents") {
            None => ProcessContents::Strict,
            Some(value) => ProcessContents::parse(value)
                .ok_or_else(|| self.error(elem, scope, format!("invalid processContents '{}'", value)))?,
        };
        Ok(Wildcard::new(constraint, process_contents))
    }

    fn value_constraint(&self, elem: &Element, scope: &Scope) -> Result<Option<ValueConstraint>> {
        match (elem.get_attribute("default"), elem.get_attribute("fixed")) {
            (Some(_), Some(_)) => Err(self.error(elem, scope, "'default' and 'fixed' are mutually exclusive")),
            (Some(value), None) => Ok(Some(ValueConstraint {
                kind: ValueConstraintKind::Default,
                value: value.to_string(),
            })),
            (None, Some(value)) => Ok(Some(ValueConstraint {
                kind: ValueConstraintKind::Fixed,
                value: value.to_string(),
            })),
            (None, None) => Ok(None),
        }
    }

    fn info(&self, name: Option<QName>, scope: &Scope) -> ComponentInfo {
        match name {
            Some(name) => ComponentInfo::global(name, scope.document),
            None => ComponentInfo::local(None, scope.document),
        }
    }

    fn declare(&mut self, name: QName, id: ComponentId) {
        if let Err(e) = self.registry.declare(&name, id) {
            self.errors.push(e);
        }
    }

    fn global_name(&self, elem: &Element, scope: &Scope) -> Result<QName> {
        let local_name = self.ncname(elem, scope)?;
        Ok(QName::new(scope.target_namespace.clone(), local_name))
    }

    fn ncname(&self, elem: &Element, scope: &Scope) -> Result<String> {
        let name = elem
            .get_attribute("name")
            .ok_or_else(|| self.error(elem, scope, "missing required attribute 'name'"))?;
        names::validate_ncname(name).map_err(|e| self.error(elem, scope, e.to_string()))?;
        Ok(name.to_string())
    }

    fn resolve_qname(&self, elem: &Element, value: &str, scope: &Scope) -> Result<QName> {
        let mut name = elem
            .resolve_qname(value)
            .map_err(|e| self.error(elem, scope, format!("cannot resolve QName '{}': {}", value, e)))?;
        if scope.chameleon && name.namespace.is_none() {
            name.namespace = scope.target_namespace.clone();
        }
        Ok(name)
    }

    fn type_ref(&self, elem: &Element, value: &str, scope: &Scope) -> Result<TypeRef> {
        Ok(TypeRef::Named(Reference::new(self.resolve_qname(elem, value, scope)?)))
    }

    fn occurs(&self, elem: &Element, scope: &Scope) -> Result<Occurs> {
        parse_occurs(elem.get_attribute("minOccurs"), elem.get_attribute("maxOccurs"))
            .map_err(|e| self.relocate(e, elem, scope))
    }

    fn parse_bool(&self, elem: &Element, attribute: &str, scope: &Scope) -> Result<Option<bool>> {
        match elem.get_attribute(attribute).map(str::trim) {
            None => Ok(None),
            Some("true") | Some("1") => Ok(Some(true)),
            Some("false") | Some("0") => Ok(Some(false)),
            Some(other) => Err(self.error(
                elem,
                scope,
                format!("invalid boolean '{}' for attribute '{}'", other, attribute),
            )),
        }
    }

    fn forbid(&self, elem: &Element, scope: &Scope, attributes: &[&str], what: &str) -> Result<()> {
        match attributes.iter().find(|a| elem.get_attribute(a).is_some()) {
            Some(attribute) => Err(self.error(
                elem,
                scope,
                format!("attribute '{}' is not allowed on {}", attribute, what),
            )),
            None => Ok(()),
        }
    }

    fn annotation_only(&self, elem: &Element, scope: &Scope) -> Result<()> {
        match elem.children().find(|c| c.local_name() != "annotation") {
            Some(child) => Err(self.error(
                child,
                scope,
                format!("unexpected child 'xs:{}' of xs:{}", child.local_name(), elem.local_name()),
            )),
            None => Ok(()),
        }
    }

    fn expect_xsd(&self, elem: &Element, scope: &Scope) -> Result<()> {
        if elem.namespace() == Some(XSD_NAMESPACE) {
            Ok(())
        } else {
            Err(self.error(elem, scope, format!("unexpected non-schema element '{}'", elem.qname)))
        }
    }

    fn error(&self, elem: &Element, scope: &Scope, message: impl Into<String>) -> Error {
        Error::structure(message, locate(elem, scope))
    }

    fn relocate(&self, err: Error, elem: &Element, scope: &Scope) -> Error {
        match err {
            Error::SchemaStructure { message, location: None } => Error::structure(message, locate(elem, scope)),
            other => other,
        }
    }
}

fn locate(elem: &Element, scope: &Scope) -> String {
    match elem.get_attribute("name").or_else(|| elem.get_attribute("ref")) {
        Some(name) => format!("{}@{} (xs:{} '{}')", scope.location, elem.position, elem.local_name(), name),
        None => format!("{}@{} (xs:{})", scope.location, elem.position, elem.local_name()),
    }
}

fn annotation(elem: &Element) -> Annotation {
    let mut annotation = Annotation::default();
    for child in elem.children() {
        let text = child.text().trim().to_string();
        match child.local_name() {
            "documentation" => annotation.documentation.push(text),
            "appinfo" => annotation.appinfo.push(text),
            _ => {}
        }
    }
    annotation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Category, ResolutionState};
    use crate::loaders::MemoryRetriever;
    use crate::registry::bootstrap;

    const XS: &str = r#"xmlns:xs="http://www.w3.org/2001/XMLSchema""#;

    fn schema(body: &str) -> Document {
        let xml = format!(
            r#"<xs:schema {} xmlns:tns="urn:t" targetNamespace="urn:t">{}</xs:schema>"#,
            XS, body
        );
        Document::parse_str(&xml, Location::Memory("main.xsd".into())).unwrap()
    }

    fn build(doc: &Document) -> (SchemaArena, NamespaceRegistry, Result<DocumentId>, Vec<Error>) {
        let (mut arena, registry) = bootstrap().unwrap();
        let limits = Limits::default();
        let (result, errors) = {
            let mut builder = SchemaBuilder::new(&mut arena, &registry, &limits);
            let result = builder.build(doc);
            (result, builder.take_errors())
        };
        (arena, registry, result, errors)
    }

    fn structure_message(result: Result<DocumentId>) -> String {
        match result {
            Err(Error::SchemaStructure { message, .. }) => message,
            other => panic!("expected a structure error, got {:?}", other),
        }
    }

    #[test]
    fn test_build_registers_globals() {
        let doc = schema(
            r#"<xs:element name="root" type="tns:T"/>
               <xs:complexType name="T">
                 <xs:sequence><xs:element name="a" type="xs:string"/></xs:sequence>
                 <xs:attribute name="id" type="xs:ID" use="required"/>
               </xs:complexType>
               <xs:simpleType name="S"><xs:restriction base="xs:int"/></xs:simpleType>
               <xs:group name="G"><xs:choice><xs:element ref="tns:root"/></xs:choice></xs:group>
               <xs:attributeGroup name="AG"><xs:anyAttribute/></xs:attributeGroup>"#,
        );
        let (arena, registry, result, errors) = build(&doc);
        assert!(result.is_ok());
        assert!(errors.is_empty());

        let t = registry
            .lookup(&QName::namespaced("urn:t", "T"), Category::Type)
            .unwrap();
        let ComponentId::Type(t) = t else { panic!("not a type") };
        let def = arena.type_def(t);
        assert!(def.is_complex());
        assert_eq!(def.info().state.get(), ResolutionState::Unresolved);
        assert!(registry.get(&QName::namespaced("urn:t", "G"), Category::Group).is_some());
        assert!(registry
            .get(&QName::namespaced("urn:t", "AG"), Category::AttributeGroup)
            .is_some());

        // The local element is unqualified and not registered.
        assert!(registry.get(&QName::local("a"), Category::Element).is_none());
    }

    #[test]
    fn test_two_content_models() {
        let doc = schema(
            r#"<xs:complexType name="T">
                 <xs:sequence/>
                 <xs:choice/>
               </xs:complexType>"#,
        );
        let (_, _, result, _) = build(&doc);
        assert!(structure_message(result).contains("more than one content model"));
    }

    #[test]
    fn test_type_and_inline_type() {
        let doc = schema(
            r#"<xs:element name="e" type="xs:string">
                 <xs:simpleType><xs:restriction base="xs:string"/></xs:simpleType>
               </xs:element>"#,
        );
        let (_, _, result, _) = build(&doc);
        assert!(structure_message(result).contains("both a 'type' attribute and an inline type"));
    }

    #[test]
    fn test_default_with_required_use() {
        let doc = schema(
            r#"<xs:complexType name="T">
                 <xs:attribute name="a" type="xs:string" use="required" default="x"/>
               </xs:complexType>"#,
        );
        let (_, _, result, _) = build(&doc);
        assert!(structure_message(result).contains("use=\"optional\""));
    }

    #[test]
    fn test_nested_all_rejected() {
        let doc = schema(
            r#"<xs:complexType name="T">
                 <xs:sequence><xs:all><xs:element name="a"/></xs:all></xs:sequence>
               </xs:complexType>"#,
        );
        let (_, _, result, _) = build(&doc);
        assert!(structure_message(result).contains("top-level particle"));

        let doc = schema(
            r#"<xs:complexType name="T">
                 <xs:all><xs:element name="a" maxOccurs="2"/></xs:all>
               </xs:complexType>"#,
        );
        let (_, _, result, _) = build(&doc);
        assert!(structure_message(result).contains("maxOccurs 0 or 1"));
    }

    #[test]
    fn test_invalid_occurs_is_located() {
        let doc = schema(
            r#"<xs:complexType name="T">
                 <xs:sequence><xs:element name="a" minOccurs="3" maxOccurs="2"/></xs:sequence>
               </xs:complexType>"#,
        );
        let (_, _, result, _) = build(&doc);
        match result {
            Err(Error::SchemaStructure { location: Some(location), .. }) => {
                assert!(location.contains("main.xsd"));
                assert!(location.contains("xs:element 'a'"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_duplicates_are_collected() {
        let doc = schema(
            r#"<xs:simpleType name="S"><xs:restriction base="xs:int"/></xs:simpleType>
               <xs:complexType name="S"/>
               <xs:element name="e"/>
               <xs:element name="e"/>"#,
        );
        let (_, _, result, errors) = build(&doc);
        assert!(result.is_ok());
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| matches!(e, Error::DuplicateDeclaration { .. })));
    }

    #[test]
    fn test_redefine_unsupported() {
        let doc = schema(r#"<xs:redefine schemaLocation="other.xsd"/>"#);
        let (_, _, result, _) = build(&doc);
        assert!(structure_message(result).contains("redefine"));
    }

    #[test]
    fn test_self_import_rejected() {
        let doc = schema(r#"<xs:import namespace="urn:t"/>"#);
        let (_, _, result, _) = build(&doc);
        assert!(structure_message(result).contains("own target namespace"));
    }

    #[test]
    fn test_import_records_edge() {
        let doc = schema(r#"<xs:import namespace="urn:o" schemaLocation="o.xsd"/>"#);
        let (_, registry, result, _) = build(&doc);
        let info = registry.document(result.unwrap()).unwrap();
        assert_eq!(info.imports.len(), 1);
        assert_eq!(info.imports[0].namespace.as_deref(), Some("urn:o"));
        assert_eq!(info.imports[0].location, Some(Location::Memory("o.xsd".into())));
        assert!(!registry.is_loaded(Some("urn:o")));
    }

    #[test]
    fn test_chameleon_include() {
        let included = format!(
            r#"<xs:schema {}><xs:complexType name="Part"/><xs:element name="p" type="Part"/></xs:schema>"#,
            XS
        );
        let retriever = MemoryRetriever::new().with_document("part.xsd", included);
        let doc = schema(r#"<xs:include schemaLocation="part.xsd"/>"#);

        let (mut arena, registry) = bootstrap().unwrap();
        let limits = Limits::default();
        let mut builder = SchemaBuilder::new(&mut arena, &registry, &limits).with_retriever(&retriever);
        builder.build(&doc).unwrap();
        assert!(builder.take_errors().is_empty());

        let part = QName::namespaced("urn:t", "Part");
        assert!(registry.get(&part, Category::Type).is_some());
        let Some(ComponentId::Element(p)) = registry.get(&QName::namespaced("urn:t", "p"), Category::Element) else {
            panic!("element not registered in the includer's namespace");
        };
        match &arena.element(p).type_ref {
            Some(TypeRef::Named(r)) => assert_eq!(r.name, part),
            other => panic!("unexpected type ref {:?}", other),
        }
    }

    #[test]
    fn test_include_namespace_mismatch() {
        let included = format!(r#"<xs:schema {} targetNamespace="urn:other"/>"#, XS);
        let retriever = MemoryRetriever::new().with_document("part.xsd", included);
        let doc = schema(r#"<xs:include schemaLocation="part.xsd"/>"#);

        let (mut arena, registry) = bootstrap().unwrap();
        let limits = Limits::default();
        let mut builder = SchemaBuilder::new(&mut arena, &registry, &limits).with_retriever(&retriever);
        builder.build(&doc).unwrap();
        let errors = builder.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], Error::SchemaStructure { message, .. } if message.contains("targetNamespace")));
    }

    #[test]
    fn test_annotations_captured() {
        let doc = schema(
            r#"<xs:simpleType name="S">
                 <xs:annotation><xs:documentation> A code. </xs:documentation></xs:annotation>
                 <xs:restriction base="xs:string"/>
               </xs:simpleType>"#,
        );
        let (arena, registry, _, _) = build(&doc);
        let Some(ComponentId::Type(id)) = registry.get(&QName::namespaced("urn:t", "S"), Category::Type) else {
            panic!("missing type");
        };
        let annotation = arena.type_def(id).info().annotation.clone().unwrap();
        assert_eq!(annotation.documentation, vec!["A code.".to_string()]);
    }

    #[test]
    fn test_non_schema_root() {
        let doc = Document::from_string("<root/>").unwrap();
        let (_, _, result, _) = build(&doc);
        assert!(structure_message(result).contains("expected xs:schema"));
    }
}
