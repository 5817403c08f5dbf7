//! Type derivation tests
//!
//! Facet narrowing, attribute inheritance and the errors reported for
//! invalid or circular derivations.

use pretty_assertions::assert_eq;
use xmlschema_compiler::components::TypeId;
use xmlschema_compiler::derivation::{ContentTypeLabel, Variety};
use xmlschema_compiler::{compile, CompileError, ComponentModel, Document, Error, ValidationErrorKind};

fn try_compile(body: &str) -> Result<ComponentModel, CompileError> {
    let xsd = format!(
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">{}</xs:schema>"#,
        body
    );
    compile(&[Document::from_string(&xsd).expect("schema should parse")])
}

fn model(body: &str) -> ComponentModel {
    try_compile(body).expect("schema should compile")
}

fn errors(body: &str) -> CompileError {
    match try_compile(body) {
        Ok(_) => panic!("schema should not compile"),
        Err(err) => err,
    }
}

const SMALL: &str = r#"
    <xs:simpleType name="Small">
      <xs:restriction base="xs:integer"><xs:maxInclusive value="100"/></xs:restriction>
    </xs:simpleType>"#;

// ============================================================================
// Simple types
// ============================================================================

#[test]
fn test_narrowed_bound_applies() {
    let model = model(&format!(
        r#"{}
           <xs:simpleType name="Smaller">
             <xs:restriction base="Small"><xs:maxInclusive value="50"/></xs:restriction>
           </xs:simpleType>"#,
        SMALL
    ));
    let smaller = model.resolve_type(None, "Smaller").unwrap();
    assert_eq!(model.validate_value(smaller, "30").unwrap(), "30");
    let err = model.validate_value(smaller, "75").unwrap_err();
    assert_eq!(err.kind, ValidationErrorKind::InvalidValue);

    let small = model.resolve_type(None, "Small").unwrap();
    assert!(model.validate_value(small, "75").is_ok());
    assert!(model.is_derived_from(smaller, small));
    assert!(!model.is_derived_from(small, smaller));
}

#[test]
fn test_loosened_bound_is_rejected() {
    let err = errors(&format!(
        r#"{}
           <xs:simpleType name="Smaller">
             <xs:restriction base="Small"><xs:maxInclusive value="50"/></xs:restriction>
           </xs:simpleType>
           <xs:simpleType name="Wider">
             <xs:restriction base="Smaller"><xs:maxInclusive value="100"/></xs:restriction>
           </xs:simpleType>"#,
        SMALL
    ));
    assert!(err.any(|e| matches!(e, Error::InvalidFacetRestriction { facet, .. } if facet == "maxInclusive")));
}

#[test]
fn test_whitespace_and_length() {
    let model = model(
        r#"<xs:simpleType name="Code">
             <xs:restriction base="xs:token"><xs:length value="3"/></xs:restriction>
           </xs:simpleType>"#,
    );
    let code = model.resolve_type(None, "Code").unwrap();
    assert_eq!(model.validate_value(code, "  ABC  ").unwrap(), "ABC");
    assert!(model.validate_value(code, "ABCD").is_err());
}

#[test]
fn test_list_and_union_varieties() {
    let model = model(
        r#"<xs:simpleType name="Ints"><xs:list itemType="xs:int"/></xs:simpleType>
           <xs:simpleType name="IntOrDate"><xs:union memberTypes="xs:int xs:date"/></xs:simpleType>"#,
    );
    let ints = model.resolve_type(None, "Ints").unwrap();
    assert!(matches!(
        model.effective_simple_type(ints).map(|s| &s.variety),
        Some(Variety::List(_))
    ));
    assert!(model.validate_value(ints, "1 2 3").is_ok());
    assert!(model.validate_value(ints, "1 two").is_err());

    let union = model.resolve_type(None, "IntOrDate").unwrap();
    assert!(model.validate_value(union, "42").is_ok());
    assert!(model.validate_value(union, "2024-02-29").is_ok());
    assert!(model.validate_value(union, "soon").is_err());
}

// ============================================================================
// Complex types
// ============================================================================

#[test]
fn test_attribute_inheritance() {
    let model = model(
        r#"<xs:complexType name="Base">
             <xs:sequence><xs:element name="a"/></xs:sequence>
             <xs:attribute name="id" type="xs:ID"/>
           </xs:complexType>
           <xs:complexType name="Derived"><xs:complexContent>
             <xs:extension base="Base"><xs:attribute name="lang" type="xs:language"/></xs:extension>
           </xs:complexContent></xs:complexType>"#,
    );
    let derived = model.resolve_type(None, "Derived").unwrap();
    let names: Vec<String> = model
        .attributes(derived)
        .unwrap()
        .keys()
        .map(|name| name.to_string())
        .collect();
    assert_eq!(names, vec!["id".to_string(), "lang".to_string()]);
    assert_eq!(
        model.effective_complex_type(derived).map(|c| c.label),
        Some(ContentTypeLabel::ElementOnly)
    );
    let base = model.resolve_type(None, "Base").unwrap();
    assert_eq!(model.derivation_chain(derived), vec![derived, base, TypeId::ANY_TYPE]);
}

#[test]
fn test_extension_redeclaring_attribute() {
    let err = errors(
        r#"<xs:complexType name="Base"><xs:attribute name="id"/></xs:complexType>
           <xs:complexType name="Derived"><xs:complexContent>
             <xs:extension base="Base"><xs:attribute name="id"/></xs:extension>
           </xs:complexContent></xs:complexType>"#,
    );
    assert!(err.any(|e| matches!(e, Error::DuplicateAttribute { .. })));
}

#[test]
fn test_restriction_cannot_make_required_optional() {
    let err = errors(
        r#"<xs:complexType name="Base"><xs:attribute name="id" use="required"/></xs:complexType>
           <xs:complexType name="Loose"><xs:complexContent>
             <xs:restriction base="Base"><xs:attribute name="id" use="optional"/></xs:restriction>
           </xs:complexContent></xs:complexType>"#,
    );
    assert!(matches!(&err.errors[..], [Error::InvalidAttributeRestriction { attribute, .. }] if attribute.local_name == "id"));
}

// ============================================================================
// Cycles
// ============================================================================

#[test]
fn test_circular_type_definition() {
    let err = errors(
        r#"<xs:complexType name="A"><xs:complexContent><xs:extension base="B"/></xs:complexContent></xs:complexType>
           <xs:complexType name="B"><xs:complexContent><xs:extension base="A"/></xs:complexContent></xs:complexType>"#,
    );
    assert!(err.any(|e| matches!(e, Error::CircularTypeDefinition { .. })));
}

#[test]
fn test_circular_group_reference() {
    let err = errors(
        r#"<xs:group name="G1"><xs:sequence><xs:group ref="G2"/></xs:sequence></xs:group>
           <xs:group name="G2"><xs:sequence><xs:group ref="G1"/></xs:sequence></xs:group>"#,
    );
    let cycles = err
        .iter()
        .filter(|e| matches!(e, Error::CircularGroupReference { .. }))
        .count();
    assert_eq!(cycles, 1);
}

#[test]
fn test_recursive_element_content_is_allowed() {
    let model = model(
        r#"<xs:element name="node" type="Node"/>
           <xs:complexType name="Node"><xs:sequence>
             <xs:element ref="node" minOccurs="0" maxOccurs="unbounded"/>
           </xs:sequence></xs:complexType>"#,
    );
    let doc = Document::from_string("<node><node/><node><node/></node></node>").unwrap();
    assert!(model.is_valid(&doc));
}

#[test]
fn test_invalid_default_value() {
    let err = errors(r#"<xs:element name="count" type="xs:int" default="many"/>"#);
    assert!(err.any(|e| matches!(e, Error::InvalidValueConstraint { constraint: "default", .. })));
}
