//! Content model compiler
//!
//! Translates the resolved particle tree of a complex type into a
//! deterministic automaton over element names:
//!
//! - [`nfa`] builds a Thompson-style NFA (occurrence bounds unrolled, `all`
//!   groups as a counting lattice over consumed children)
//! - [`dfa`] determinizes it by subset construction
//!
//! The resulting [`ContentModel`] is immutable and shared by every
//! validation against its type.

pub mod dfa;
pub mod nfa;

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::components::{describe, Category, ElementId, TypeId, Wildcard};
use crate::derivation::{ContentTypeLabel, DerivedTypes, EffectiveType, SubstitutionGroups};
use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::namespaces::QName;
use crate::registry::SchemaArena;

/// An input symbol of a content automaton
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Symbol {
    /// A named element and the declaration it validates against
    Element {
        /// Element name
        name: QName,
        /// Declaration
        element: ElementId,
    },
    /// Any element admitted by a wildcard, unless the alphabet names it
    Wildcard {
        /// The wildcard
        wildcard: Wildcard,
    },
}

impl Symbol {
    /// Whether an element with this name is read by the symbol
    pub fn matches(&self, name: &QName) -> bool {
        match self {
            Symbol::Element { name: n, .. } => n == name,
            Symbol::Wildcard { wildcard } => wildcard.allows(name.namespace()),
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Element { name, .. } => write!(f, "{}", name),
            Symbol::Wildcard { wildcard } => f.write_str(&wildcard.describe()),
        }
    }
}

/// A transition of a DFA state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    /// Index into the alphabet
    pub symbol: usize,
    /// Target state
    pub target: usize,
    /// Set when only this wildcard's moves read the element symbol
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wildcard: Option<usize>,
}

/// A DFA state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct State {
    /// End of content is allowed here
    pub accepting: bool,
    /// Outgoing transitions, ordered by symbol
    pub transitions: Vec<Transition>,
}

/// Deterministic content automaton
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Automaton {
    /// Element and wildcard symbols, in order of first appearance
    pub alphabet: Vec<Symbol>,
    /// States; `start` indexes into it
    pub states: Vec<State>,
    /// Initial state
    pub start: usize,
}

impl Automaton {
    /// Next state on an element name, with the symbol that read it
    ///
    /// A symbol naming the element wins over wildcards. Wildcard
    /// transitions only apply to names outside the alphabet. When a named
    /// element is only reachable through a wildcard move, that wildcard is
    /// returned as the reader.
    pub fn step(&self, state: usize, name: &QName) -> Option<(usize, &Symbol)> {
        let transitions = &self.states.get(state)?.transitions;
        let in_alphabet = self
            .alphabet
            .iter()
            .any(|s| matches!(s, Symbol::Element { name: n, .. } if n == name));

        transitions
            .iter()
            .map(|t| (t, &self.alphabet[t.symbol]))
            .find(|(_, symbol)| match symbol {
                Symbol::Element { name: n, .. } => n == name,
                Symbol::Wildcard { .. } => !in_alphabet && symbol.matches(name),
            })
            .map(|(t, symbol)| (t.target, t.wildcard.map_or(symbol, |w| &self.alphabet[w])))
    }

    /// Whether the state accepts end of content
    pub fn is_accepting(&self, state: usize) -> bool {
        self.states.get(state).map_or(false, |s| s.accepting)
    }

    /// Display names of the symbols readable from a state
    pub fn expected(&self, state: usize) -> Vec<String> {
        self.states.get(state).map_or_else(Vec::new, |s| {
            s.transitions
                .iter()
                .map(|t| self.alphabet[t.symbol].to_string())
                .collect()
        })
    }

    /// Run a whole name sequence from the start state
    pub fn accepts<'n>(&self, names: impl IntoIterator<Item = &'n QName>) -> bool {
        let mut state = self.start;
        for name in names {
            match self.step(state, name) {
                Some((next, _)) => state = next,
                None => return false,
            }
        }
        self.is_accepting(state)
    }

    /// Number of states
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Number of transitions
    pub fn transition_count(&self) -> usize {
        self.states.iter().map(|s| s.transitions.len()).sum()
    }
}

/// Compiled content model of a type
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentModel {
    /// No children and no text
    Empty,
    /// Character data of a simple type
    Simple {
        /// Nearest simple type of the derivation chain
        value_type: TypeId,
    },
    /// Child elements driven by an automaton
    Elements {
        /// The automaton
        automaton: Automaton,
        /// Text may interleave with children
        mixed: bool,
    },
}

impl ContentModel {
    /// The automaton of element content
    pub fn automaton(&self) -> Option<&Automaton> {
        match self {
            ContentModel::Elements { automaton, .. } => Some(automaton),
            _ => None,
        }
    }

    /// Whether character data may appear between children
    pub fn is_mixed(&self) -> bool {
        matches!(self, ContentModel::Elements { mixed: true, .. })
    }

    /// Pretty JSON view of the model for code generators
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Compile the content model of a derived type
pub fn compile_content_model(
    arena: &SchemaArena,
    derived: &DerivedTypes,
    substitutions: &SubstitutionGroups,
    limits: &Limits,
    type_id: TypeId,
) -> Result<ContentModel> {
    let owner = describe(Category::Type, arena.type_def(type_id).info());
    let info = derived.get(type_id).ok_or_else(|| Error::InvalidDerivation {
        type_name: owner.clone(),
        reason: "the type has no derivation result".to_string(),
    })?;

    let complex = match &info.effective {
        EffectiveType::Simple(_) => return Ok(ContentModel::Simple { value_type: type_id }),
        EffectiveType::Complex(complex) => complex,
    };
    match complex.label {
        ContentTypeLabel::Empty => Ok(ContentModel::Empty),
        ContentTypeLabel::Simple => {
            let value_type = derived
                .chain(type_id)
                .into_iter()
                .find(|t| derived.simple(*t).is_some())
                .unwrap_or(TypeId::ANY_SIMPLE_TYPE);
            Ok(ContentModel::Simple { value_type })
        }
        ContentTypeLabel::ElementOnly | ContentTypeLabel::Mixed => {
            let mut builder = nfa::NfaBuilder::new(arena, substitutions, limits, &owner);
            let nfa = builder.build(complex.particle.as_ref())?;
            let alphabet = builder.into_alphabet();
            let states = dfa::determinize(&nfa, &alphabet, limits, &owner)?;
            debug!(
                owner = owner.as_str(),
                nfa_states = nfa.len(),
                dfa_states = states.len(),
                symbols = alphabet.len(),
                "content model compiled"
            );
            Ok(ContentModel::Elements {
                automaton: Automaton {
                    alphabet,
                    states,
                    start: 0,
                },
                mixed: complex.mixed,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{NamespaceConstraint, ProcessContents};

    fn name(local: &str) -> QName {
        QName::local(local)
    }

    fn sample() -> Automaton {
        // a, then any number of ##other elements
        Automaton {
            alphabet: vec![
                Symbol::Element {
                    name: name("a"),
                    element: ElementId::from_index(0),
                },
                Symbol::Wildcard {
                    wildcard: Wildcard::new(NamespaceConstraint::Other(None), ProcessContents::Lax),
                },
            ],
            states: vec![
                State {
                    accepting: false,
                    transitions: vec![Transition { symbol: 0, target: 1, wildcard: None }],
                },
                State {
                    accepting: true,
                    transitions: vec![Transition { symbol: 1, target: 1, wildcard: None }],
                },
            ],
            start: 0,
        }
    }

    #[test]
    fn test_step_and_accepts() {
        let automaton = sample();
        let foreign = QName::namespaced("urn:x", "b");
        assert!(automaton.accepts([&name("a"), &foreign, &foreign]));
        assert!(!automaton.accepts([&name("a"), &name("a")]));
        assert!(!automaton.accepts([&foreign]));
        assert!(!automaton.accepts(std::iter::empty()));
        assert_eq!(automaton.expected(0), vec!["a".to_string()]);
        assert_eq!(automaton.transition_count(), 2);
    }

    #[test]
    fn test_json_view() {
        let model = ContentModel::Elements {
            automaton: sample(),
            mixed: false,
        };
        let json: serde_json::Value = serde_json::from_str(&model.to_json().unwrap()).unwrap();
        assert_eq!(json["kind"], "elements");
        assert_eq!(json["automaton"]["states"][1]["accepting"], true);
        assert_eq!(json["automaton"]["alphabet"][0]["kind"], "element");
        assert_eq!(ContentModel::Empty.to_json().unwrap(), "{\n  \"kind\": \"empty\"\n}");
    }
}
