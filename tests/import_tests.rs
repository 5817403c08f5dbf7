//! Include and import tests
//!
//! Multi-document schemas assembled through in-memory and filesystem
//! retrievers.

use std::fs;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use xmlschema_compiler::components::Category;
use xmlschema_compiler::locations::Location;
use xmlschema_compiler::{Compiler, Document, Error, FileRetriever, MemoryRetriever, QName};

const COMMON: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
        targetNamespace="urn:common" elementFormDefault="qualified">
      <xs:simpleType name="Currency">
        <xs:restriction base="xs:string">
          <xs:enumeration value="EUR"/><xs:enumeration value="USD"/>
        </xs:restriction>
      </xs:simpleType>
    </xs:schema>"#;

const ORDERS: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
        xmlns="urn:orders" xmlns:c="urn:common"
        targetNamespace="urn:orders" elementFormDefault="qualified">
      <xs:import namespace="urn:common" schemaLocation="common.xsd"/>
      <xs:include schemaLocation="items.xsd"/>
      <xs:element name="order">
        <xs:complexType>
          <xs:sequence><xs:element name="item" type="Item" maxOccurs="unbounded"/></xs:sequence>
          <xs:attribute name="currency" type="c:Currency" use="required"/>
        </xs:complexType>
      </xs:element>
    </xs:schema>"#;

// No target namespace: the include adopts urn:orders.
const ITEMS: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
      <xs:complexType name="Item">
        <xs:simpleContent>
          <xs:extension base="xs:string"><xs:attribute name="sku" type="xs:token"/></xs:extension>
        </xs:simpleContent>
      </xs:complexType>
    </xs:schema>"#;

const INSTANCE: &str = r#"<order xmlns="urn:orders" currency="EUR">
      <item sku="A-1">pencil</item>
      <item>eraser</item>
    </order>"#;

#[test]
fn test_memory_include_and_import() {
    let retriever = MemoryRetriever::new()
        .with_document("common.xsd", COMMON)
        .with_document("items.xsd", ITEMS);
    let main = Document::parse_str(ORDERS, Location::Memory("orders.xsd".into())).unwrap();
    let model = Compiler::new().with_retriever(retriever).compile(&[main]).unwrap();

    assert!(model.resolve_type(Some("urn:orders"), "Item").is_some());
    assert!(model.resolve_type(Some("urn:common"), "Currency").is_some());
    assert!(model.resolve_type(None, "Item").is_none());
    assert_eq!(model.report().imports_loaded, 1);

    let instance = Document::from_string(INSTANCE).unwrap();
    let errors = model.document_errors(&instance);
    assert!(errors.is_empty(), "{:?}", errors);

    let wrong = Document::from_string(&INSTANCE.replace("EUR", "GBP")).unwrap();
    assert!(!model.is_valid(&wrong));
}

#[test]
fn test_import_by_namespace() {
    let retriever = MemoryRetriever::new()
        .with_namespace(Some("urn:common"), COMMON)
        .with_document("items.xsd", ITEMS);
    let main = Document::parse_str(
        &ORDERS.replace(r#" schemaLocation="common.xsd""#, ""),
        Location::Memory("orders.xsd".into()),
    )
    .unwrap();
    let model = Compiler::new().with_retriever(retriever).compile(&[main]).unwrap();
    assert!(model.resolve_type(Some("urn:common"), "Currency").is_some());
}

#[test]
fn test_missing_import_is_reported() {
    let retriever = MemoryRetriever::new().with_document("items.xsd", ITEMS);
    let main = Document::parse_str(ORDERS, Location::Memory("orders.xsd".into())).unwrap();
    let err = Compiler::new().with_retriever(retriever).compile(&[main]).unwrap_err();
    assert!(err.any(|e| matches!(e, Error::ImportUnavailable { namespace: Some(ns), .. } if ns == "urn:common")));
}

#[test]
fn test_documents_compiled_together() {
    let common = Document::parse_str(COMMON, Location::Memory("common.xsd".into())).unwrap();
    let main = Document::parse_str(
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:c="urn:common">
             <xs:import namespace="urn:common"/>
             <xs:element name="price" type="c:Currency"/>
           </xs:schema>"#,
        Location::Memory("main.xsd".into()),
    )
    .unwrap();
    let model = Compiler::new().compile(&[common, main]).unwrap();
    assert_eq!(model.report().imports_loaded, 0);
    let names: Vec<QName> = model
        .globals(Category::Element)
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(names, vec![QName::local("price")]);
}

#[test]
fn test_filesystem_retrieval() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("orders.xsd"), ORDERS).unwrap();
    fs::write(dir.path().join("common.xsd"), COMMON).unwrap();
    fs::write(dir.path().join("items.xsd"), ITEMS).unwrap();

    let retriever = FileRetriever::new();
    let location = Location::Path(dir.path().join("orders.xsd"));
    let text = retriever.load(&location).unwrap();
    let main = Document::parse_str(&text, location).unwrap();
    let model = Compiler::new().with_retriever(retriever).compile(&[main]).unwrap();

    let instance = Document::from_string(INSTANCE).unwrap();
    assert!(model.is_valid(&instance));
}
