//! Runtime validation against a compiled component model
//!
//! Two entry points:
//!
//! - [`validate_events`] runs a flat stream of child element names and text
//!   through the content model of one type
//! - [`validate_document`] walks a whole instance tree, checking attributes,
//!   simple values, nil-ness and child sequences, recursing through the
//!   declaration attached to each automaton symbol
//!
//! Validation only borrows the model, so concurrent validations need no
//! coordination. `xsi:type` is not honoured: elements always validate
//! against their declared type.

use tracing::trace;

use crate::automata::{Automaton, ContentModel, Symbol};
use crate::components::{Category, ComponentId, ElementId, ProcessContents, TypeId, ValueConstraint};
use crate::derivation::EffectiveComplexType;
use crate::documents::{Document, Element, Node};
use crate::error::{ValidationError, ValidationErrorKind};
use crate::model::ComponentModel;
use crate::namespaces::{QName, XSI_NAMESPACE};

/// One item of element content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentEvent {
    /// A child element start
    Element(QName),
    /// Character data between children
    Text(String),
}

impl ContentEvent {
    /// Child element event
    pub fn element(name: QName) -> Self {
        ContentEvent::Element(name)
    }

    /// Character data event
    pub fn text(text: impl Into<String>) -> Self {
        ContentEvent::Text(text.into())
    }
}

/// Whether validation stops at the first error or collects them all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Raise the first error
    #[default]
    Strict,
    /// Collect every error and keep going
    Lazy,
}

/// Error collection and current element path
#[derive(Debug, Default)]
struct ValidationContext {
    mode: ValidationMode,
    errors: Vec<ValidationError>,
    path: Vec<String>,
}

impl ValidationContext {
    fn new(mode: ValidationMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    fn path(&self) -> String {
        format!("/{}", self.path.join("/"))
    }

    fn raise_or_collect(&mut self, error: ValidationError) -> Result<(), ValidationError> {
        let error = if error.path.is_none() {
            let path = self.path();
            error.with_path(path)
        } else {
            error
        };
        match self.mode {
            ValidationMode::Strict => Err(error),
            ValidationMode::Lazy => {
                self.errors.push(error);
                Ok(())
            }
        }
    }
}

/// Cursor of one element's children through an automaton
struct ContentRun<'m> {
    automaton: &'m Automaton,
    state: usize,
    mixed: bool,
}

impl<'m> ContentRun<'m> {
    fn new(automaton: &'m Automaton, mixed: bool) -> Self {
        Self {
            automaton,
            state: automaton.start,
            mixed,
        }
    }

    fn element(&mut self, name: &QName) -> Result<&'m Symbol, ValidationError> {
        match self.automaton.step(self.state, name) {
            Some((next, symbol)) => {
                self.state = next;
                Ok(symbol)
            }
            None => Err(ValidationError::new(
                ValidationErrorKind::UnexpectedElement,
                format!("Unexpected child element '{}'", name),
            )
            .with_expected(self.automaton.expected(self.state))),
        }
    }

    fn text(&self, text: &str) -> Result<(), ValidationError> {
        if self.mixed || text.trim().is_empty() {
            Ok(())
        } else {
            Err(unexpected_text(text))
        }
    }

    fn finish(&self) -> Result<(), ValidationError> {
        if self.automaton.is_accepting(self.state) {
            Ok(())
        } else {
            Err(ValidationError::new(
                ValidationErrorKind::IncompleteContent,
                "The content is incomplete: more child elements are required",
            )
            .with_expected(self.automaton.expected(self.state)))
        }
    }
}

fn unexpected_text(text: &str) -> ValidationError {
    ValidationError::new(
        ValidationErrorKind::UnexpectedText,
        format!("Character data '{}' is not allowed here", text.trim()),
    )
}

fn unexpected_element(name: &QName, reason: &str) -> ValidationError {
    ValidationError::new(
        ValidationErrorKind::UnexpectedElement,
        format!("Unexpected child element '{}'", name),
    )
    .with_reason(reason)
}

/// Validate a flat event stream against the content model of a type
pub fn validate_events<I>(model: &ComponentModel, type_id: TypeId, events: I) -> Result<(), ValidationError>
where
    I: IntoIterator<Item = ContentEvent>,
{
    let content = model.content_model(type_id).ok_or_else(|| model.unknown_type(type_id))?;
    match content {
        ContentModel::Empty => {
            for event in events {
                match event {
                    ContentEvent::Element(name) => return Err(unexpected_element(&name, "the content is empty")),
                    ContentEvent::Text(text) if !text.trim().is_empty() => return Err(unexpected_text(&text)),
                    ContentEvent::Text(_) => {}
                }
            }
            Ok(())
        }
        ContentModel::Simple { .. } => {
            let mut value = String::new();
            for event in events {
                match event {
                    ContentEvent::Element(name) => {
                        return Err(unexpected_element(&name, "the content is a simple value"));
                    }
                    ContentEvent::Text(text) => value.push_str(&text),
                }
            }
            model.validate_value(type_id, &value).map(|_| ())
        }
        ContentModel::Elements { automaton, mixed } => {
            let mut run = ContentRun::new(automaton, *mixed);
            for event in events {
                match event {
                    ContentEvent::Element(name) => {
                        run.element(&name)?;
                    }
                    ContentEvent::Text(text) => run.text(&text)?,
                }
            }
            run.finish()
        }
    }
}

/// Validate an instance document; in lazy mode every error is returned
pub fn validate_document(
    model: &ComponentModel,
    document: &Document,
    mode: ValidationMode,
) -> Result<Vec<ValidationError>, ValidationError> {
    let mut context = ValidationContext::new(mode);
    let Some(root) = document.root() else {
        context.raise_or_collect(ValidationError::new(
            ValidationErrorKind::IncompleteContent,
            "Document has no root element",
        ))?;
        return Ok(context.errors);
    };

    context.path.push(root.qname.to_string());
    match model.global_element(&root.qname) {
        None => context.raise_or_collect(ValidationError::new(
            ValidationErrorKind::UnknownComponent,
            format!("No global element declaration for root element '{}'", root.qname),
        ))?,
        Some(id) if model.element(id).is_abstract => context.raise_or_collect(ValidationError::new(
            ValidationErrorKind::UnexpectedElement,
            format!("Root element '{}' is declared abstract", root.qname),
        ))?,
        Some(id) => validate_element(model, &mut context, root, id)?,
    }
    Ok(context.errors)
}

fn validate_element(
    model: &ComponentModel,
    context: &mut ValidationContext,
    element: &Element,
    decl_id: ElementId,
) -> Result<(), ValidationError> {
    let decl = model.element(decl_id);
    let type_id = model.element_type(decl_id);

    if element.get_attribute_qname(&QName::namespaced(XSI_NAMESPACE, "type")).is_some() {
        trace!(element = %element.qname, "xsi:type ignored");
    }

    let nil = element
        .get_attribute_qname(&QName::namespaced(XSI_NAMESPACE, "nil"))
        .map(str::trim);
    if let Some(nil) = nil {
        if !matches!(nil, "true" | "false" | "1" | "0") {
            context.raise_or_collect(ValidationError::new(
                ValidationErrorKind::InvalidValue,
                format!("Invalid xsi:nil value '{}'", nil),
            ))?;
        } else if matches!(nil, "true" | "1") {
            if !decl.nillable {
                context.raise_or_collect(ValidationError::new(
                    ValidationErrorKind::InvalidValue,
                    format!("Element '{}' is not nillable", element.qname),
                ))?;
            } else {
                if let Some(child) = element.children().next() {
                    context.raise_or_collect(unexpected_element(&child.qname, "a nilled element must be empty"))?;
                } else if element.has_text() {
                    context.raise_or_collect(unexpected_text(&element.text()))?;
                }
                if let Some(complex) = model.effective_complex_type(type_id) {
                    validate_attributes(model, context, element, complex)?;
                }
                return Ok(());
            }
        }
    }

    validate_typed(model, context, element, type_id, decl.value_constraint.as_ref())
}

fn validate_typed(
    model: &ComponentModel,
    context: &mut ValidationContext,
    element: &Element,
    type_id: TypeId,
    constraint: Option<&ValueConstraint>,
) -> Result<(), ValidationError> {
    let Some(content) = model.content_model(type_id) else {
        return context.raise_or_collect(model.unknown_type(type_id));
    };

    match model.effective_complex_type(type_id) {
        Some(complex) => validate_attributes(model, context, element, complex)?,
        None => {
            for name in element.attributes.keys() {
                if name.namespace() != Some(XSI_NAMESPACE) {
                    context.raise_or_collect(ValidationError::new(
                        ValidationErrorKind::UnexpectedAttribute,
                        format!("Attribute '{}' is not allowed on an element of simple type", name),
                    ))?;
                }
            }
        }
    }

    match content {
        ContentModel::Empty => {
            if let Some(child) = element.children().next() {
                context.raise_or_collect(unexpected_element(&child.qname, "the content is empty"))?;
            } else if element.has_text() {
                context.raise_or_collect(unexpected_text(&element.text()))?;
            }
        }
        ContentModel::Simple { .. } => {
            if let Some(child) = element.children().next() {
                context.raise_or_collect(unexpected_element(&child.qname, "the content is a simple value"))?;
            } else {
                check_text(model, context, element, type_id, constraint)?;
            }
        }
        ContentModel::Elements { automaton, mixed } => {
            let mut run = ContentRun::new(automaton, *mixed);
            for node in &element.nodes {
                match node {
                    Node::Text(text) => {
                        if let Err(e) = run.text(text) {
                            context.raise_or_collect(e)?;
                        }
                    }
                    Node::Element(child) => {
                        context.path.push(child.qname.to_string());
                        match run.element(&child.qname) {
                            Ok(Symbol::Element { element: child_decl, .. }) => {
                                validate_element(model, context, child, *child_decl)?;
                            }
                            Ok(Symbol::Wildcard { wildcard }) => {
                                validate_wildcard_match(model, context, child, wildcard.process_contents)?;
                            }
                            Err(e) => context.raise_or_collect(e)?,
                        }
                        context.path.pop();
                    }
                }
            }
            if let Err(e) = run.finish() {
                context.raise_or_collect(e)?;
            }
            if let Some(fixed) = constraint.filter(|c| c.is_fixed()) {
                if *mixed && element.children().next().is_none() && element.text() != fixed.value {
                    context.raise_or_collect(ValidationError::new(
                        ValidationErrorKind::InvalidValue,
                        format!("Content '{}' does not match the fixed value '{}'", element.text(), fixed.value),
                    ))?;
                }
            }
        }
    }
    Ok(())
}

/// Facet-check character data, applying the declaration's default or fixed value
fn check_text(
    model: &ComponentModel,
    context: &mut ValidationContext,
    element: &Element,
    type_id: TypeId,
    constraint: Option<&ValueConstraint>,
) -> Result<(), ValidationError> {
    let mut text = element.text();
    if text.is_empty() {
        if let Some(constraint) = constraint {
            text = constraint.value.clone();
        }
    }
    match model.validate_value(type_id, &text) {
        Err(e) => context.raise_or_collect(e),
        Ok(normalized) => {
            let Some(fixed) = constraint.filter(|c| c.is_fixed()) else {
                return Ok(());
            };
            let expected = model
                .validate_value(type_id, &fixed.value)
                .unwrap_or_else(|_| fixed.value.clone());
            if normalized == expected {
                Ok(())
            } else {
                context.raise_or_collect(ValidationError::new(
                    ValidationErrorKind::InvalidValue,
                    format!("Value '{}' does not match the fixed value '{}'", normalized, fixed.value),
                ))
            }
        }
    }
}

fn validate_attributes(
    model: &ComponentModel,
    context: &mut ValidationContext,
    element: &Element,
    complex: &EffectiveComplexType,
) -> Result<(), ValidationError> {
    for (name, value) in &element.attributes {
        if name.namespace() == Some(XSI_NAMESPACE) {
            continue;
        }
        if let Some(attribute) = complex.attributes.get(name) {
            check_attribute_value(model, context, name, value, attribute.type_id, attribute.value_constraint.as_ref())?;
            continue;
        }
        let Some(wildcard) = complex.attribute_wildcard.as_ref().filter(|w| w.allows(name.namespace())) else {
            context.raise_or_collect(ValidationError::new(
                ValidationErrorKind::UnexpectedAttribute,
                format!("Attribute '{}' is not allowed", name),
            ))?;
            continue;
        };
        if wildcard.process_contents == ProcessContents::Skip {
            continue;
        }
        match model.registry().get(name, Category::Attribute) {
            Some(ComponentId::Attribute(id)) => {
                let decl = model.arena().attribute(id);
                let type_id = decl
                    .type_ref
                    .as_ref()
                    .and_then(|t| t.get())
                    .unwrap_or(TypeId::ANY_SIMPLE_TYPE);
                check_attribute_value(model, context, name, value, type_id, decl.value_constraint.as_ref())?;
            }
            _ if wildcard.process_contents == ProcessContents::Strict => {
                context.raise_or_collect(ValidationError::new(
                    ValidationErrorKind::UnknownComponent,
                    format!("No global declaration for attribute '{}' matched by a strict wildcard", name),
                ))?;
            }
            _ => {}
        }
    }

    for (name, attribute) in &complex.attributes {
        if attribute.use_ == crate::components::AttributeUse::Required && !element.attributes.contains_key(name) {
            context.raise_or_collect(ValidationError::new(
                ValidationErrorKind::MissingAttribute,
                format!("Missing required attribute '{}'", name),
            ))?;
        }
    }
    Ok(())
}

fn check_attribute_value(
    model: &ComponentModel,
    context: &mut ValidationContext,
    name: &QName,
    value: &str,
    type_id: TypeId,
    constraint: Option<&ValueConstraint>,
) -> Result<(), ValidationError> {
    let normalized = match model.validate_value(type_id, value) {
        Ok(normalized) => normalized,
        Err(e) => {
            let mut error = ValidationError::new(
                ValidationErrorKind::InvalidValue,
                format!("Invalid value for attribute '{}': {}", name, e.message),
            );
            if let Some(reason) = e.reason {
                error = error.with_reason(reason);
            }
            return context.raise_or_collect(error);
        }
    };
    if let Some(fixed) = constraint.filter(|c| c.is_fixed()) {
        let expected = model
            .validate_value(type_id, &fixed.value)
            .unwrap_or_else(|_| fixed.value.clone());
        if normalized != expected {
            return context.raise_or_collect(ValidationError::new(
                ValidationErrorKind::InvalidValue,
                format!("Attribute '{}' must have the fixed value '{}'", name, fixed.value),
            ));
        }
    }
    Ok(())
}

/// Validate an element read by a wildcard symbol, per processContents
fn validate_wildcard_match(
    model: &ComponentModel,
    context: &mut ValidationContext,
    element: &Element,
    process_contents: ProcessContents,
) -> Result<(), ValidationError> {
    if process_contents == ProcessContents::Skip {
        return Ok(());
    }
    match model.global_element(&element.qname) {
        Some(id) => validate_element(model, context, element, id),
        None if process_contents == ProcessContents::Strict => context.raise_or_collect(ValidationError::new(
            ValidationErrorKind::UnknownComponent,
            format!("No global declaration for element '{}' matched by a strict wildcard", element.qname),
        )),
        None => {
            for child in element.children() {
                context.path.push(child.qname.to_string());
                validate_wildcard_match(model, context, child, ProcessContents::Lax)?;
                context.path.pop();
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locations::Location;
    use crate::model::compile;

    fn model(body: &str) -> ComponentModel {
        let xml = format!(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">{}</xs:schema>"#,
            body
        );
        let doc = Document::parse_str(&xml, Location::Memory("test.xsd".into())).unwrap();
        compile(&[doc]).unwrap()
    }

    fn events(names: &[&str]) -> Vec<ContentEvent> {
        names.iter().map(|n| ContentEvent::element(QName::local(*n))).collect()
    }

    fn kind(result: Result<(), ValidationError>) -> Option<ValidationErrorKind> {
        result.err().map(|e| e.kind)
    }

    #[test]
    fn test_sequence_events() {
        let model = model(
            r#"<xs:complexType name="T"><xs:sequence>
                 <xs:element name="A"/><xs:element name="B"/>
               </xs:sequence></xs:complexType>"#,
        );
        let t = model.resolve_type(None, "T").unwrap();
        assert!(model.validate(t, events(&["A", "B"])).is_ok());
        assert_eq!(kind(model.validate(t, events(&["B", "A"]))), Some(ValidationErrorKind::UnexpectedElement));
        let err = model.validate(t, events(&["A"])).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::IncompleteContent);
        assert_eq!(err.expected, vec!["B".to_string()]);
        assert_eq!(
            kind(model.validate(t, vec![ContentEvent::text("x")])),
            Some(ValidationErrorKind::UnexpectedText)
        );
    }

    #[test]
    fn test_mixed_and_simple_events() {
        let model = model(
            r#"<xs:complexType name="M" mixed="true"><xs:sequence><xs:element name="b"/></xs:sequence></xs:complexType>
               <xs:simpleType name="Code"><xs:restriction base="xs:string"><xs:pattern value="[A-Z]{3}"/></xs:restriction></xs:simpleType>"#,
        );
        let m = model.resolve_type(None, "M").unwrap();
        let mixed = vec![
            ContentEvent::text("hello "),
            ContentEvent::element(QName::local("b")),
            ContentEvent::text(" world"),
        ];
        assert!(model.validate(m, mixed).is_ok());

        let code = model.resolve_type(None, "Code").unwrap();
        assert!(model.validate(code, vec![ContentEvent::text("AB"), ContentEvent::text("C")]).is_ok());
        assert_eq!(
            kind(model.validate(code, vec![ContentEvent::text("abc")])),
            Some(ValidationErrorKind::InvalidValue)
        );
    }

    const ORDERS: &str = r###"
        <xs:element name="order">
          <xs:complexType>
            <xs:sequence>
              <xs:element name="item" maxOccurs="unbounded">
                <xs:complexType>
                  <xs:simpleContent>
                    <xs:extension base="xs:positiveInteger">
                      <xs:attribute name="sku" type="xs:token" use="required"/>
                    </xs:extension>
                  </xs:simpleContent>
                </xs:complexType>
              </xs:element>
              <xs:element name="note" type="xs:string" minOccurs="0" nillable="true"/>
              <xs:any namespace="##other" processContents="skip" minOccurs="0"/>
            </xs:sequence>
            <xs:attribute name="status" type="xs:string" fixed="open"/>
          </xs:complexType>
        </xs:element>"###;

    fn document(xml: &str) -> Document {
        Document::from_string(xml).unwrap()
    }

    #[test]
    fn test_valid_document() {
        let model = model(ORDERS);
        let doc = document(
            r#"<order status="open"><item sku="A1">2</item><item sku="B2"> 7 </item>
               <note xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:nil="true"/>
               <x:ext xmlns:x="urn:ext"><anything/></x:ext></order>"#,
        );
        assert_eq!(model.document_errors(&doc), Vec::<ValidationError>::new());
        assert!(model.is_valid(&doc));
    }

    #[test]
    fn test_document_errors_collected() {
        let model = model(ORDERS);
        let doc = document(
            r#"<order status="closed" extra="1"><item>0</item><note>n</note><bogus/></order>"#,
        );
        let kinds: Vec<ValidationErrorKind> = model.document_errors(&doc).into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ValidationErrorKind::InvalidValue,
                ValidationErrorKind::UnexpectedAttribute,
                ValidationErrorKind::MissingAttribute,
                ValidationErrorKind::InvalidValue,
                ValidationErrorKind::UnexpectedElement,
            ]
        );

        let first = model.validate_document(&doc).unwrap_err();
        assert_eq!(first.kind, ValidationErrorKind::InvalidValue);
        assert_eq!(first.path.as_deref(), Some("/order"));
    }

    #[test]
    fn test_error_paths() {
        let model = model(ORDERS);
        let doc = document(r#"<order><item sku="a">x</item></order>"#);
        let err = model.validate_document(&doc).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::InvalidValue);
        assert_eq!(err.path.as_deref(), Some("/order/item"));
    }

    #[test]
    fn test_unknown_and_abstract_roots() {
        let model = model(
            r#"<xs:element name="head" abstract="true"/>
               <xs:element name="real" substitutionGroup="head"/>"#,
        );
        let err = model.validate_document(&document("<nothing/>")).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::UnknownComponent);
        let err = model.validate_document(&document("<head/>")).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::UnexpectedElement);
        assert!(model.validate_document(&document("<real><any-child/></real>")).is_ok());
    }

    #[test]
    fn test_wildcard_read_name_follows_process_contents() {
        let model = model(
            r###"<xs:element name="r"><xs:complexType><xs:sequence>
                 <xs:element name="a" type="xs:int"/>
                 <xs:any namespace="##any" processContents="skip"/>
               </xs:sequence></xs:complexType></xs:element>"###,
        );
        assert!(model.is_valid(&document("<r><a>1</a><a>not a number</a></r>")));
        let err = model.validate_document(&document("<r><a>oops</a><a>1</a></r>")).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::InvalidValue);
    }

    #[test]
    fn test_nil_on_non_nillable() {
        let model = model(r#"<xs:element name="n" type="xs:int"/>"#);
        let doc = document(
            r#"<n xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:nil="true"/>"#,
        );
        assert_eq!(model.validate_document(&doc).unwrap_err().kind, ValidationErrorKind::InvalidValue);
    }

    #[test]
    fn test_default_and_fixed_element_values() {
        let model = model(
            r#"<xs:element name="root"><xs:complexType><xs:sequence>
                 <xs:element name="d" type="xs:int" default="5"/>
                 <xs:element name="f" type="xs:decimal" fixed="1.0"/>
               </xs:sequence></xs:complexType></xs:element>"#,
        );
        assert!(model.is_valid(&document("<root><d/><f>1.0</f></root>")));
        assert!(model.is_valid(&document("<root><d/><f/></root>")));
        assert!(!model.is_valid(&document("<root><d/><f>2.0</f></root>")));
    }
}
