//! XSD built-in types
//!
//! The builtin datatypes are ordinary simple type definitions, pushed into the
//! arena right after `xs:anyType` and `xs:anySimpleType` when a registry is
//! created. Their ids are therefore constant. Each one carries a lexical check
//! and the facets it implies (whiteSpace, integer ranges, ...), so user
//! restrictions of builtins go through the ordinary facet-narrowing rules.

use std::fmt;

use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::facets::{parse_float, FacetDecl, FacetKind, ValueSpace};
use super::groups::{Occurs, Particle, Term};
use super::types::{ComplexContentDecl, ComplexTypeDef, DerivationMethod, SimpleTypeDef, SimpleVariety, TypeRef};
use super::wildcards::Wildcard;
use super::{ComponentInfo, DocumentId, StateCell, TypeId};
use crate::names;

static DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)$").unwrap());
static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]?\d+$").unwrap());
static FLOAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?|-?INF|NaN)$").unwrap());
static DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?P(\d+Y)?(\d+M)?(\d+D)?(T(\d+H)?(\d+M)?(\d+(\.\d+)?S)?)?$").unwrap());
static DATETIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?\d{4,}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})?$").unwrap()
});
static DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d{4,}-\d{2}-\d{2}(Z|[+-]\d{2}:\d{2})?$").unwrap());
static TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})?$").unwrap());
static GYEAR_MONTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d{4,}-\d{2}(Z|[+-]\d{2}:\d{2})?$").unwrap());
static GYEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d{4,}(Z|[+-]\d{2}:\d{2})?$").unwrap());
static GMONTH_DAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^--\d{2}-\d{2}(Z|[+-]\d{2}:\d{2})?$").unwrap());
static GDAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^---\d{2}(Z|[+-]\d{2}:\d{2})?$").unwrap());
static GMONTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^--\d{2}(Z|[+-]\d{2}:\d{2})?$").unwrap());
static HEX_BINARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([0-9a-fA-F]{2})*$").unwrap());
static URI_SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").unwrap());

/// Built-in simple types, in arena order (parents before children)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[allow(missing_docs)]
pub enum BuiltinType {
    String,
    NormalizedString,
    Token,
    Language,
    Name,
    NCName,
    ID,
    IDREF,
    ENTITY,
    NMTOKEN,
    Boolean,
    Decimal,
    Integer,
    NonPositiveInteger,
    NegativeInteger,
    Long,
    Int,
    Short,
    Byte,
    NonNegativeInteger,
    UnsignedLong,
    UnsignedInt,
    UnsignedShort,
    UnsignedByte,
    PositiveInteger,
    Float,
    Double,
    Duration,
    DateTime,
    Time,
    Date,
    GYearMonth,
    GYear,
    GMonthDay,
    GDay,
    GMonth,
    HexBinary,
    Base64Binary,
    AnyURI,
    QName,
    NOTATION,
    IDREFS,
    ENTITIES,
    NMTOKENS,
}

use BuiltinType::*;

impl BuiltinType {
    /// Every builtin, in discriminant order
    pub const ALL: [BuiltinType; 44] = [
        String,
        NormalizedString,
        Token,
        Language,
        Name,
        NCName,
        ID,
        IDREF,
        ENTITY,
        NMTOKEN,
        Boolean,
        Decimal,
        Integer,
        NonPositiveInteger,
        NegativeInteger,
        Long,
        Int,
        Short,
        Byte,
        NonNegativeInteger,
        UnsignedLong,
        UnsignedInt,
        UnsignedShort,
        UnsignedByte,
        PositiveInteger,
        Float,
        Double,
        Duration,
        DateTime,
        Time,
        Date,
        GYearMonth,
        GYear,
        GMonthDay,
        GDay,
        GMonth,
        HexBinary,
        Base64Binary,
        AnyURI,
        QName,
        NOTATION,
        IDREFS,
        ENTITIES,
        NMTOKENS,
    ];

    /// Arena id; builtins follow `anyType` and `anySimpleType`
    pub fn type_id(self) -> TypeId {
        TypeId(self as u32 + 2)
    }

    /// The builtin stored at an arena id, if any
    pub fn from_type_id(id: TypeId) -> Option<Self> {
        (id.0 as usize).checked_sub(2).and_then(|i| Self::ALL.get(i).copied())
    }

    /// Look up a builtin by its XSD local name
    pub fn from_local_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| b.name() == name)
    }

    /// XSD local name
    pub fn name(self) -> &'static str {
        match self {
            String => "string",
            NormalizedString => "normalizedString",
            Token => "token",
            Language => "language",
            Name => "Name",
            NCName => "NCName",
            ID => "ID",
            IDREF => "IDREF",
            ENTITY => "ENTITY",
            NMTOKEN => "NMTOKEN",
            Boolean => "boolean",
            Decimal => "decimal",
            Integer => "integer",
            NonPositiveInteger => "nonPositiveInteger",
            NegativeInteger => "negativeInteger",
            Long => "long",
            Int => "int",
            Short => "short",
            Byte => "byte",
            NonNegativeInteger => "nonNegativeInteger",
            UnsignedLong => "unsignedLong",
            UnsignedInt => "unsignedInt",
            UnsignedShort => "unsignedShort",
            UnsignedByte => "unsignedByte",
            PositiveInteger => "positiveInteger",
            Float => "float",
            Double => "double",
            Duration => "duration",
            DateTime => "dateTime",
            Time => "time",
            Date => "date",
            GYearMonth => "gYearMonth",
            GYear => "gYear",
            GMonthDay => "gMonthDay",
            GDay => "gDay",
            GMonth => "gMonth",
            HexBinary => "hexBinary",
            Base64Binary => "base64Binary",
            AnyURI => "anyURI",
            QName => "QName",
            NOTATION => "NOTATION",
            IDREFS => "IDREFS",
            ENTITIES => "ENTITIES",
            NMTOKENS => "NMTOKENS",
        }
    }

    /// Qualified name in the XSD namespace
    pub fn qname(self) -> crate::namespaces::QName {
        crate::namespaces::QName::xsd(self.name())
    }

    /// Base builtin; None means `xs:anySimpleType`
    pub fn base(self) -> Option<BuiltinType> {
        Some(match self {
            NormalizedString => String,
            Token => NormalizedString,
            Language | Name | NMTOKEN => Token,
            NCName => Name,
            ID | IDREF | ENTITY => NCName,
            Integer => Decimal,
            NonPositiveInteger | Long | NonNegativeInteger => Integer,
            NegativeInteger => NonPositiveInteger,
            Int => Long,
            Short => Int,
            Byte => Short,
            UnsignedLong | PositiveInteger => NonNegativeInteger,
            UnsignedInt => UnsignedLong,
            UnsignedShort => UnsignedInt,
            UnsignedByte => UnsignedShort,
            _ => return None,
        })
    }

    /// Item type of the builtin list types
    pub fn item_type(self) -> Option<BuiltinType> {
        match self {
            IDREFS => Some(IDREF),
            ENTITIES => Some(ENTITY),
            NMTOKENS => Some(NMTOKEN),
            _ => None,
        }
    }

    /// The primitive this builtin is derived from
    pub fn primitive(self) -> BuiltinType {
        let mut current = self;
        while let Some(base) = current.base() {
            current = base;
        }
        current
    }

    /// Value space used for range facets
    pub fn value_space(self) -> ValueSpace {
        match self.primitive() {
            Decimal => ValueSpace::Decimal,
            Float | Double => ValueSpace::Float,
            DateTime => ValueSpace::DateTime,
            Date => ValueSpace::Date,
            Time => ValueSpace::Time,
            _ => ValueSpace::Unordered,
        }
    }

    /// Facets implied by the definition of this builtin
    pub fn implied_facets(self) -> Vec<FacetDecl> {
        let range = |min: Option<&str>, max: Option<&str>| {
            min.map(|v| FacetDecl::new(FacetKind::MinInclusive, v))
                .into_iter()
                .chain(max.map(|v| FacetDecl::new(FacetKind::MaxInclusive, v)))
                .collect::<Vec<_>>()
        };
        match self {
            String => vec![FacetDecl::new(FacetKind::WhiteSpace, "preserve")],
            NormalizedString => vec![FacetDecl::new(FacetKind::WhiteSpace, "replace")],
            Token => vec![FacetDecl::new(FacetKind::WhiteSpace, "collapse")],
            Integer => vec![FacetDecl::fixed(FacetKind::FractionDigits, "0")],
            NonPositiveInteger => range(None, Some("0")),
            NegativeInteger => range(None, Some("-1")),
            Long => range(Some("-9223372036854775808"), Some("9223372036854775807")),
            Int => range(Some("-2147483648"), Some("2147483647")),
            Short => range(Some("-32768"), Some("32767")),
            Byte => range(Some("-128"), Some("127")),
            NonNegativeInteger => range(Some("0"), None),
            UnsignedLong => range(None, Some("18446744073709551615")),
            UnsignedInt => range(None, Some("4294967295")),
            UnsignedShort => range(None, Some("65535")),
            UnsignedByte => range(None, Some("255")),
            PositiveInteger => range(Some("1"), None),
            IDREFS | ENTITIES | NMTOKENS => vec![FacetDecl::new(FacetKind::MinLength, "1")],
            b if b.base().is_none() => vec![FacetDecl::fixed(FacetKind::WhiteSpace, "collapse")],
            _ => Vec::new(),
        }
    }

    /// Check a whitespace-normalized literal against the lexical space
    pub fn check_lexical(self, value: &str) -> std::result::Result<(), std::string::String> {
        let ok = match self {
            String | NormalizedString | Token => true,
            Language => names::is_valid_language(value),
            Name => names::is_valid_name(value),
            NCName | ID | IDREF | ENTITY => names::is_valid_ncname(value),
            NMTOKEN => names::is_valid_nmtoken(value),
            Boolean => matches!(value, "true" | "false" | "1" | "0"),
            Decimal => DECIMAL.is_match(value),
            Integer | NonPositiveInteger | NegativeInteger | Long | Int | Short | Byte
            | NonNegativeInteger | UnsignedLong | UnsignedInt | UnsignedShort | UnsignedByte
            | PositiveInteger => INTEGER.is_match(value),
            Float | Double => FLOAT.is_match(value) && parse_float(value).is_some(),
            Duration => DURATION.is_match(value) && !value.ends_with('P') && !value.ends_with('T'),
            DateTime => DATETIME.is_match(value) && ValueSpace::DateTime.parse(value).is_some(),
            Date => DATE.is_match(value) && ValueSpace::Date.parse(value).is_some(),
            Time => TIME.is_match(value) && ValueSpace::Time.parse(value).is_some(),
            GYearMonth => GYEAR_MONTH.is_match(value),
            GYear => GYEAR.is_match(value),
            GMonthDay => GMONTH_DAY.is_match(value),
            GDay => GDAY.is_match(value),
            GMonth => GMONTH.is_match(value),
            HexBinary => HEX_BINARY.is_match(value),
            Base64Binary => decode_base64(value).is_some(),
            AnyURI => {
                !value.contains(['\n', '\r', '\t'])
                    && (!URI_SCHEME.is_match(value) || url::Url::parse(value).is_ok())
            }
            QName | NOTATION => names::is_valid_qname(value),
            // List builtins are checked item by item.
            IDREFS | ENTITIES | NMTOKENS => true,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("'{}' is not a valid value for xs:{}", value, self.name()))
        }
    }

    /// Length of a value in the unit the length facets count
    pub fn length_of(self, value: &str) -> u64 {
        match self.primitive() {
            HexBinary => (value.len() / 2) as u64,
            Base64Binary => decode_base64(value).map_or(0, |bytes| bytes.len() as u64),
            _ => value.chars().count() as u64,
        }
    }

    /// Arena definition of this builtin
    pub fn definition(self, document: DocumentId) -> SimpleTypeDef {
        let variety = match self.item_type() {
            Some(item) => SimpleVariety::List {
                item_type: TypeRef::builtin(item.qname(), item.type_id()),
            },
            None => SimpleVariety::Restriction {
                base: match self.base() {
                    Some(base) => TypeRef::builtin(base.qname(), base.type_id()),
                    None => TypeRef::any_simple_type(),
                },
                facets: Vec::new(),
            },
        };
        SimpleTypeDef {
            info: resolved_info(self.qname(), document),
            variety,
            builtin: Some(self),
        }
    }
}

impl fmt::Display for BuiltinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xs:{}", self.name())
    }
}

fn decode_base64(value: &str) -> Option<Vec<u8>> {
    let cleaned: std::string::String = value.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD.decode(cleaned).ok()
}

/// Component info of a builtin: global, in the XSD namespace, already resolved
pub(crate) fn resolved_info(name: crate::namespaces::QName, document: DocumentId) -> ComponentInfo {
    ComponentInfo {
        name: Some(name),
        global: true,
        document,
        state: StateCell::resolved(),
        annotation: None,
    }
}

/// `xs:anyType`: mixed content, any elements and attributes, laxly
pub(crate) fn any_type(document: DocumentId) -> ComplexTypeDef {
    let mut def = ComplexTypeDef::new(resolved_info(crate::namespaces::QName::xsd("anyType"), document));
    def.base = None;
    def.derivation = DerivationMethod::None;
    def.content = ComplexContentDecl::Complex {
        particle: Some(Particle::new(Occurs::zero_or_more(), Term::Wildcard(Wildcard::any_lax()))),
    };
    def.mixed = true;
    def.attribute_wildcard = Some(Wildcard::any_lax());
    def
}

/// `xs:anySimpleType`: restriction of `xs:anyType` with no facets
pub(crate) fn any_simple_type(document: DocumentId) -> SimpleTypeDef {
    SimpleTypeDef {
        info: resolved_info(crate::namespaces::QName::xsd("anySimpleType"), document),
        variety: SimpleVariety::Restriction {
            base: TypeRef::any_type(),
            facets: Vec::new(),
        },
        builtin: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_follow_ur_types() {
        assert_eq!(String.type_id(), TypeId(2));
        for (i, b) in BuiltinType::ALL.iter().enumerate() {
            assert_eq!(b.type_id(), TypeId(i as u32 + 2));
            assert_eq!(BuiltinType::from_type_id(b.type_id()), Some(*b));
        }
        assert_eq!(BuiltinType::from_type_id(TypeId::ANY_SIMPLE_TYPE), None);
    }

    #[test]
    fn test_parents_precede_children() {
        for b in BuiltinType::ALL {
            if let Some(base) = b.base() {
                assert!(base < b, "{} listed before its base {}", b, base);
            }
            if let Some(item) = b.item_type() {
                assert!(item < b);
            }
        }
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(BuiltinType::from_local_name("unsignedShort"), Some(UnsignedShort));
        assert_eq!(BuiltinType::from_local_name("anyType"), None);
        assert_eq!(Byte.primitive(), Decimal);
        assert_eq!(Byte.value_space(), ValueSpace::Decimal);
        assert_eq!(Token.value_space(), ValueSpace::Unordered);
    }

    #[test]
    fn test_boolean_lexical_space() {
        for ok in ["true", "false", "1", "0"] {
            assert!(Boolean.check_lexical(ok).is_ok(), "{}", ok);
        }
        for bad in ["True", "FALSE", "yes", "2", ""] {
            assert!(Boolean.check_lexical(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_numeric_lexical_space() {
        assert!(Decimal.check_lexical("-1.5").is_ok());
        assert!(Decimal.check_lexical(".5").is_ok());
        assert!(Decimal.check_lexical("1e5").is_err());
        assert!(Integer.check_lexical("+42").is_ok());
        assert!(Integer.check_lexical("4.0").is_err());
        assert!(Double.check_lexical("1.5E-3").is_ok());
        assert!(Double.check_lexical("-INF").is_ok());
        assert!(Double.check_lexical("inf").is_err());
    }

    #[test]
    fn test_temporal_lexical_space() {
        assert!(DateTime.check_lexical("2024-02-29T10:00:00Z").is_ok());
        assert!(DateTime.check_lexical("2023-02-29T10:00:00").is_err());
        assert!(Date.check_lexical("2024-01-31+05:30").is_ok());
        assert!(Time.check_lexical("25:00:00").is_err());
        assert!(Duration.check_lexical("P1Y2M3DT4H").is_ok());
        assert!(Duration.check_lexical("P").is_err());
        assert!(Duration.check_lexical("P1DT").is_err());
        assert!(GYear.check_lexical("2024").is_ok());
    }

    #[test]
    fn test_binary_lengths() {
        assert!(HexBinary.check_lexical("0FB7").is_ok());
        assert!(HexBinary.check_lexical("0FB").is_err());
        assert_eq!(HexBinary.length_of("0FB7"), 2);
        assert!(Base64Binary.check_lexical("aGVsbG8=").is_ok());
        assert_eq!(Base64Binary.length_of("aGVsbG8="), 5);
        assert!(Base64Binary.check_lexical("not base64!").is_err());
    }

    #[test]
    fn test_names_and_uris() {
        assert!(NCName.check_lexical("a:b").is_err());
        assert!(QName.check_lexical("a:b").is_ok());
        assert!(Language.check_lexical("en-US").is_ok());
        assert!(AnyURI.check_lexical("urn:example:a").is_ok());
        assert!(AnyURI.check_lexical("../relative/path.xsd").is_ok());
    }

    #[test]
    fn test_implied_facets() {
        assert_eq!(Byte.implied_facets().len(), 2);
        assert!(Boolean
            .implied_facets()
            .iter()
            .any(|f| f.kind == FacetKind::WhiteSpace && f.fixed));
        assert!(Int.implied_facets().iter().all(|f| f.kind != FacetKind::WhiteSpace));
    }

    #[test]
    fn test_definitions() {
        let def = NMTOKENS.definition(DocumentId(0));
        assert!(matches!(def.variety, SimpleVariety::List { .. }));
        let def = Int.definition(DocumentId(0));
        match &def.variety {
            SimpleVariety::Restriction { base, .. } => assert_eq!(base.get(), Some(Long.type_id())),
            other => panic!("unexpected variety {:?}", other),
        }
    }
}
