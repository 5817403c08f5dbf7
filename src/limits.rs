//! Limits and constraints for schema compilation
//!
//! Caps that keep a hostile or accidentally huge schema from exhausting memory:
//! include/import depth, component counts, and the size of the automata built
//! for content models (occurrence unrolling and `all` groups both grow state
//! counts quickly).

use crate::error::{Error, Result};

/// Global limits configuration
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum element nesting depth of a parsed document
    pub max_xml_depth: usize,

    /// Maximum XML file size in bytes
    pub max_xml_size: usize,

    /// Maximum nesting of includes/imports
    pub max_schema_depth: usize,

    /// Maximum number of schema components
    pub max_schema_components: usize,

    /// Maximum number of states in a content-model automaton (NFA or DFA)
    pub max_automaton_states: usize,

    /// Maximum number of members of an `all` group; its lattice takes
    /// `2^n` states, which the presets keep under `max_automaton_states`
    pub max_all_group_members: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_xml_depth: 1000,
            max_xml_size: 100 * 1024 * 1024, // 100 MB
            max_schema_depth: 100,
            max_schema_components: 100000,
            max_automaton_states: 1 << 17,
            max_all_group_members: 16,
        }
    }
}

impl Limits {
    /// Create a new Limits with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create strict limits (more restrictive)
    pub fn strict() -> Self {
        Self {
            max_xml_depth: 100,
            max_xml_size: 10 * 1024 * 1024, // 10 MB
            max_schema_depth: 20,
            max_schema_components: 10000,
            max_automaton_states: 5000,
            max_all_group_members: 10,
        }
    }

    /// Create permissive limits (less restrictive, use with caution)
    pub fn permissive() -> Self {
        Self {
            max_xml_depth: 10000,
            max_xml_size: 1024 * 1024 * 1024, // 1 GB
            max_schema_depth: 1000,
            max_schema_components: 1000000,
            max_automaton_states: 1 << 21,
            max_all_group_members: 20,
        }
    }

    /// Check if XML depth is within limits
    pub fn check_xml_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_xml_depth {
            Err(Error::LimitExceeded(format!(
                "XML depth {} exceeds maximum {}",
                depth, self.max_xml_depth
            )))
        } else {
            Ok(())
        }
    }

    /// Check if XML size is within limits
    pub fn check_xml_size(&self, size: usize) -> Result<()> {
        if size > self.max_xml_size {
            Err(Error::LimitExceeded(format!(
                "XML size {} bytes exceeds maximum {} bytes",
                size, self.max_xml_size
            )))
        } else {
            Ok(())
        }
    }

    /// Check if schema depth is within limits
    pub fn check_schema_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_schema_depth {
            Err(Error::LimitExceeded(format!(
                "Schema depth {} exceeds maximum {}",
                depth, self.max_schema_depth
            )))
        } else {
            Ok(())
        }
    }

    /// Check if number of schema components is within limits
    pub fn check_schema_components(&self, count: usize) -> Result<()> {
        if count > self.max_schema_components {
            Err(Error::LimitExceeded(format!(
                "Schema component count {} exceeds maximum {}",
                count, self.max_schema_components
            )))
        } else {
            Ok(())
        }
    }

    /// Check if an automaton state count is within limits
    pub fn check_automaton_states(&self, count: usize, owner: &str) -> Result<()> {
        if count > self.max_automaton_states {
            Err(Error::LimitExceeded(format!(
                "Content model of {} needs more than {} automaton states",
                owner, self.max_automaton_states
            )))
        } else {
            Ok(())
        }
    }

    /// Check if an `all` group is narrow enough for a counting automaton
    pub fn check_all_group_members(&self, count: usize, owner: &str) -> Result<()> {
        if count > self.max_all_group_members {
            Err(Error::LimitExceeded(format!(
                "'all' group in {} has {} members, maximum is {}",
                owner, count, self.max_all_group_members
            )))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_xml_depth, 1000);
        assert!(limits.check_xml_depth(500).is_ok());
        assert!(limits.check_xml_depth(1500).is_err());
    }

    #[test]
    fn test_strict_limits() {
        let limits = Limits::strict();
        assert!(limits.max_automaton_states < Limits::default().max_automaton_states);
        assert!(limits.check_schema_depth(21).is_err());
    }

    #[test]
    fn test_permissive_limits() {
        let limits = Limits::permissive();
        assert!(limits.max_xml_depth > Limits::default().max_xml_depth);
        assert!(limits.check_schema_components(500000).is_ok());
    }

    #[test]
    fn test_automaton_limits() {
        let limits = Limits::default();
        assert!(limits.check_automaton_states(100, "T").is_ok());
        assert!(limits.check_automaton_states(60000, "T").is_ok());
        let err = limits.check_automaton_states(200000, "T").unwrap_err();
        assert!(err.to_string().contains("Content model of T"));
        assert!(limits.check_all_group_members(17, "T").is_err());
    }

    #[test]
    fn test_widest_all_group_fits_state_limit() {
        for limits in [Limits::default(), Limits::strict(), Limits::permissive()] {
            let lattice = 1usize << limits.max_all_group_members;
            assert!(limits.check_automaton_states(lattice + 1, "T").is_ok());
        }
    }
}
