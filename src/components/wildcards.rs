//! XSD wildcards
//!
//! `xs:any` and `xs:anyAttribute`. A wildcard admits elements or attributes by
//! namespace; `processContents` decides how far validation descends into
//! what it admitted.
//!
//! Reference: https://www.w3.org/TR/xmlschema-1/#Wildcards

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

/// Process contents mode for wildcards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ProcessContents {
    /// The matched item must have a global declaration
    #[default]
    Strict,
    /// Validate if a declaration is found, otherwise accept
    Lax,
    /// Skip validation entirely
    Skip,
}

impl ProcessContents {
    /// Parse from string value
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "strict" => Some(Self::Strict),
            "lax" => Some(Self::Lax),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }
}

impl fmt::Display for ProcessContents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Lax => write!(f, "lax"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// Namespace constraint for wildcards; `None` stands for the absent namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub enum NamespaceConstraint {
    /// Any namespace is allowed (##any)
    #[default]
    Any,
    /// Any namespace except the given one and the absent namespace (##other)
    Other(Option<String>),
    /// Specific set of allowed namespaces
    Enumeration(BTreeSet<Option<String>>),
}

impl NamespaceConstraint {
    /// Create from a `namespace` attribute value
    pub fn parse(value: &str, target_namespace: Option<&str>) -> Result<Self> {
        match value.trim() {
            "##any" => Ok(Self::Any),
            "##other" => Ok(Self::Other(target_namespace.map(String::from))),
            value => {
                let mut namespaces = BTreeSet::new();
                for ns in value.split_whitespace() {
                    match ns {
                        "##local" => {
                            namespaces.insert(None);
                        }
                        "##targetNamespace" => {
                            namespaces.insert(target_namespace.map(String::from));
                        }
                        s if s.starts_with("##") => {
                            return Err(Error::SchemaStructure {
                                message: format!("wrong value '{}' in 'namespace' attribute", s),
                                location: None,
                            });
                        }
                        uri => {
                            namespaces.insert(Some(uri.to_string()));
                        }
                    }
                }
                Ok(Self::Enumeration(namespaces))
            }
        }
    }

    /// Check if a namespace is allowed by this constraint
    pub fn allows(&self, namespace: Option<&str>) -> bool {
        match self {
            Self::Any => true,
            Self::Other(excluded) => namespace.is_some() && namespace != excluded.as_deref(),
            Self::Enumeration(set) => set.contains(&namespace.map(String::from)),
        }
    }

    /// Union of two constraints (attribute wildcard inheritance by extension)
    pub fn union(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Any, _) | (_, Self::Any) => Self::Any,
            (Self::Other(a), Self::Other(b)) if a == b => Self::Other(a.clone()),
            (Self::Other(_), Self::Other(_)) => Self::Any,
            (Self::Enumeration(a), Self::Enumeration(b)) => {
                Self::Enumeration(a.union(b).cloned().collect())
            }
            (Self::Other(excluded), Self::Enumeration(set))
            | (Self::Enumeration(set), Self::Other(excluded)) => {
                // ##other already admits every listed name except the excluded pair.
                if set.contains(&None) && set.contains(excluded) {
                    Self::Any
                } else {
                    Self::Other(excluded.clone())
                }
            }
        }
    }

    /// Intersection of two constraints (attribute group wildcards)
    ///
    /// Two `##other` constraints excluding different namespaces are not
    /// expressible; the result keeps the left exclusion, which admits a superset.
    pub fn intersection(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Any, c) | (c, Self::Any) => c.clone(),
            (Self::Other(a), Self::Other(_)) => Self::Other(a.clone()),
            (Self::Enumeration(a), Self::Enumeration(b)) => {
                Self::Enumeration(a.intersection(b).cloned().collect())
            }
            (Self::Other(_), Self::Enumeration(set)) | (Self::Enumeration(set), Self::Other(_)) => {
                let constraint = if matches!(self, Self::Other(_)) { self } else { other };
                Self::Enumeration(
                    set.iter()
                        .filter(|ns| constraint.allows(ns.as_deref()))
                        .cloned()
                        .collect(),
                )
            }
        }
    }

    /// Whether some namespace is admitted by both constraints
    pub fn overlaps(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Enumeration(set), c) | (c, Self::Enumeration(set)) => {
                set.iter().any(|ns| c.allows(ns.as_deref()))
            }
            _ => true,
        }
    }

    /// Whether every namespace admitted by `self` is admitted by `other`
    pub fn is_subset_of(&self, other: &Self) -> bool {
        match (self, other) {
            (_, Self::Any) => true,
            (Self::Any, _) => false,
            (Self::Other(a), Self::Other(b)) => a == b,
            (Self::Other(_), Self::Enumeration(_)) => false,
            (Self::Enumeration(set), other) => set.iter().all(|ns| other.allows(ns.as_deref())),
        }
    }
}

/// A wildcard term or attribute wildcard
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Wildcard {
    /// Namespace constraint
    pub constraint: NamespaceConstraint,
    /// Process contents mode
    pub process_contents: ProcessContents,
}

impl Wildcard {
    /// Create a wildcard
    pub fn new(constraint: NamespaceConstraint, process_contents: ProcessContents) -> Self {
        Self {
            constraint,
            process_contents,
        }
    }

    /// `##any` with lax processing, as used by `xs:anyType`
    pub fn any_lax() -> Self {
        Self::new(NamespaceConstraint::Any, ProcessContents::Lax)
    }

    /// Check whether a namespace is admitted
    pub fn allows(&self, namespace: Option<&str>) -> bool {
        self.constraint.allows(namespace)
    }

    /// Compact description used for automaton symbols
    pub fn describe(&self) -> String {
        let ns = match &self.constraint {
            NamespaceConstraint::Any => "##any".to_string(),
            NamespaceConstraint::Other(_) => "##other".to_string(),
            NamespaceConstraint::Enumeration(set) => set
                .iter()
                .map(|ns| ns.clone().unwrap_or_else(|| "##local".to_string()))
                .collect::<Vec<_>>()
                .join(" "),
        };
        format!("any({}, {})", ns, self.process_contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_contents_parse() {
        assert_eq!(ProcessContents::parse("lax"), Some(ProcessContents::Lax));
        assert_eq!(ProcessContents::parse("bogus"), None);
    }

    #[test]
    fn test_any_allows_everything() {
        let nc = NamespaceConstraint::parse("##any", Some("urn:t")).unwrap();
        assert!(nc.allows(None));
        assert!(nc.allows(Some("urn:x")));
    }

    #[test]
    fn test_other_excludes_target_and_absent() {
        let nc = NamespaceConstraint::parse("##other", Some("urn:t")).unwrap();
        assert!(nc.allows(Some("urn:x")));
        assert!(!nc.allows(Some("urn:t")));
        assert!(!nc.allows(None));
    }

    #[test]
    fn test_enumeration_with_keywords() {
        let nc = NamespaceConstraint::parse("##local ##targetNamespace urn:x", Some("urn:t")).unwrap();
        assert!(nc.allows(None));
        assert!(nc.allows(Some("urn:t")));
        assert!(nc.allows(Some("urn:x")));
        assert!(!nc.allows(Some("urn:y")));
        assert!(NamespaceConstraint::parse("##bogus", None).is_err());
    }

    #[test]
    fn test_union_and_subset() {
        let a = NamespaceConstraint::parse("urn:a", None).unwrap();
        let b = NamespaceConstraint::parse("urn:b", None).unwrap();
        let ab = a.union(&b);
        assert!(ab.allows(Some("urn:a")) && ab.allows(Some("urn:b")));
        assert!(a.is_subset_of(&ab));
        assert!(!ab.is_subset_of(&a));

        let other = NamespaceConstraint::Other(Some("urn:t".into()));
        assert!(a.is_subset_of(&other));
        let local_and_t = NamespaceConstraint::parse("##local urn:t", None).unwrap();
        assert_eq!(other.union(&local_and_t), NamespaceConstraint::Any);
    }

    #[test]
    fn test_intersection() {
        let other = NamespaceConstraint::Other(Some("urn:t".into()));
        let set = NamespaceConstraint::parse("##local urn:t urn:x", None).unwrap();
        let both = other.intersection(&set);
        assert!(both.allows(Some("urn:x")));
        assert!(!both.allows(Some("urn:t")));
        assert!(!both.allows(None));
        assert_eq!(NamespaceConstraint::Any.intersection(&set), set);
    }

    #[test]
    fn test_overlaps() {
        let other = NamespaceConstraint::Other(Some("urn:t".into()));
        let local = NamespaceConstraint::parse("##local", None).unwrap();
        let t = NamespaceConstraint::parse("urn:t", None).unwrap();
        assert!(other.overlaps(&NamespaceConstraint::Any));
        assert!(other.overlaps(&NamespaceConstraint::Other(None)));
        assert!(!other.overlaps(&local));
        assert!(!t.overlaps(&other));
        assert!(!local.overlaps(&t));
        assert!(NamespaceConstraint::Any.overlaps(&t));
    }

    #[test]
    fn test_wildcard_describe() {
        let w = Wildcard::new(
            NamespaceConstraint::parse("##local", None).unwrap(),
            ProcessContents::Skip,
        );
        assert_eq!(w.describe(), "any(##local, skip)");
    }
}
