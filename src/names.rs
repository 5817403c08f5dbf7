//! XML name validation and utilities
//!
//! Lexical checks for the name-like builtin datatypes and for the `name`
//! attributes of schema components.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

// Simplified NameStartChar / NameChar ranges (BMP letters used by real schemas).
const NAME_START: &str = r"A-Z_a-z\u{C0}-\u{D6}\u{D8}-\u{F6}\u{F8}-\u{2FF}\u{370}-\u{37D}\u{37F}-\u{1FFF}\u{200C}-\u{200D}\u{2070}-\u{218F}\u{2C00}-\u{2FEF}\u{3001}-\u{D7FF}\u{F900}-\u{FDCF}\u{FDF0}-\u{FFFD}";
const NAME_EXTRA: &str = r"\-\.0-9\u{B7}\u{300}-\u{36F}\u{203F}-\u{2040}";

static NCNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("^[{s}][{s}{e}]*$", s = NAME_START, e = NAME_EXTRA)).unwrap()
});

static NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("^[{s}:][{s}{e}:]*$", s = NAME_START, e = NAME_EXTRA)).unwrap()
});

static NMTOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("^[{s}{e}:]+$", s = NAME_START, e = NAME_EXTRA)).unwrap());

static LANGUAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").unwrap());

/// Check if a string is a valid XML Name
pub fn is_valid_name(name: &str) -> bool {
    NAME.is_match(name)
}

/// Check if a string is a valid NCName (non-colonized name)
pub fn is_valid_ncname(name: &str) -> bool {
    NCNAME.is_match(name)
}

/// Check if a string is a valid QName (qualified name)
pub fn is_valid_qname(name: &str) -> bool {
    match name.split_once(':') {
        Some((prefix, local)) => is_valid_ncname(prefix) && is_valid_ncname(local),
        None => is_valid_ncname(name),
    }
}

/// Check if a string is a valid NMTOKEN
pub fn is_valid_nmtoken(token: &str) -> bool {
    NMTOKEN.is_match(token)
}

/// Check if a string is a valid language tag (xs:language)
pub fn is_valid_language(tag: &str) -> bool {
    LANGUAGE.is_match(tag)
}

/// Validate an NCName and return an error if invalid
pub fn validate_ncname(name: &str) -> Result<()> {
    if is_valid_ncname(name) {
        Ok(())
    } else {
        Err(Error::Name(format!("Invalid NCName: '{}'", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_name() {
        assert!(is_valid_name("element"));
        assert!(is_valid_name("my-element"));
        assert!(is_valid_name("xs:element"));
        assert!(is_valid_name("_element"));

        assert!(!is_valid_name(""));
        assert!(!is_valid_name("123element"));
        assert!(!is_valid_name("-element"));
    }

    #[test]
    fn test_is_valid_ncname() {
        assert!(is_valid_ncname("element"));
        assert!(is_valid_ncname("my.element-2"));
        assert!(is_valid_ncname("\u{e9}l\u{e9}ment"));

        assert!(!is_valid_ncname(""));
        assert!(!is_valid_ncname("prefix:element"));
        assert!(!is_valid_ncname("has space"));
    }

    #[test]
    fn test_is_valid_qname() {
        assert!(is_valid_qname("element"));
        assert!(is_valid_qname("xs:schema"));

        assert!(!is_valid_qname(""));
        assert!(!is_valid_qname(":element"));
        assert!(!is_valid_qname("element:"));
    }

    #[test]
    fn test_nmtoken_and_language() {
        assert!(is_valid_nmtoken("123-abc"));
        assert!(!is_valid_nmtoken("a b"));
        assert!(is_valid_language("en-US"));
        assert!(!is_valid_language("toolonglanguage"));
    }

    #[test]
    fn test_validate_ncname() {
        assert!(validate_ncname("item").is_ok());
        assert!(validate_ncname("a:b").is_err());
    }
}
