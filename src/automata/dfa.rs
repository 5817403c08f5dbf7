//! Subset construction

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::components::Wildcard;
use crate::error::{Error, Result};
use crate::limits::Limits;

use super::nfa::Nfa;
use super::{State, Symbol, Transition};

/// Determinize an NFA over its alphabet; state 0 is the start state
///
/// An element symbol also follows the moves of every wildcard that admits
/// its namespace, so a name read by both a declaration and a wildcard keeps
/// both continuations. Distinct wildcards readable from the same state must
/// admit disjoint namespaces, otherwise the model is ambiguous.
pub fn determinize(nfa: &Nfa, alphabet: &[Symbol], limits: &Limits, owner: &str) -> Result<Vec<State>> {
    let readers: Vec<Vec<usize>> = alphabet
        .iter()
        .enumerate()
        .map(|(index, symbol)| match symbol {
            Symbol::Element { name, .. } => std::iter::once(index)
                .chain(alphabet.iter().enumerate().filter_map(|(other, s)| match s {
                    Symbol::Wildcard { wildcard } if wildcard.allows(name.namespace()) => Some(other),
                    _ => None,
                }))
                .collect(),
            Symbol::Wildcard { .. } => vec![index],
        })
        .collect();

    let start = closure(nfa, vec![nfa.start]);
    let mut index: HashMap<Vec<usize>, usize> = HashMap::from([(start.clone(), 0)]);
    let mut sets = vec![start];
    let mut states = vec![State {
        accepting: false,
        transitions: Vec::new(),
    }];
    let mut queue = VecDeque::from([0usize]);

    while let Some(current) = queue.pop_front() {
        states[current].accepting = sets[current].contains(&nfa.accept);
        check_wildcards_disjoint(nfa, alphabet, &sets[current], owner)?;
        for (symbol, sources) in readers.iter().enumerate() {
            let moves: Vec<(usize, usize)> = sets[current]
                .iter()
                .flat_map(|s| nfa.states[*s].moves.iter())
                .filter(|(read, _)| sources.contains(read))
                .copied()
                .collect();
            let Some((first_read, _)) = moves.first().copied() else {
                continue;
            };
            let wildcard = if moves.iter().any(|(read, _)| *read == symbol) {
                None
            } else {
                Some(first_read)
            };
            let next = closure(nfa, moves.into_iter().map(|(_, target)| target).collect());
            let target = match index.get(&next) {
                Some(target) => *target,
                None => {
                    limits.check_automaton_states(sets.len() + 1, owner)?;
                    let target = sets.len();
                    index.insert(next.clone(), target);
                    sets.push(next);
                    states.push(State {
                        accepting: false,
                        transitions: Vec::new(),
                    });
                    queue.push_back(target);
                    target
                }
            };
            states[current].transitions.push(Transition {
                symbol,
                target,
                wildcard,
            });
        }
    }
    Ok(states)
}

/// Reject two distinct wildcards that leave one state and share a namespace
fn check_wildcards_disjoint(nfa: &Nfa, alphabet: &[Symbol], set: &[usize], owner: &str) -> Result<()> {
    let mut wildcards: Vec<&Wildcard> = Vec::new();
    let mut seen: Vec<usize> = Vec::new();
    for (read, _) in set.iter().flat_map(|s| nfa.states[*s].moves.iter()) {
        let Symbol::Wildcard { wildcard } = &alphabet[*read] else {
            continue;
        };
        if seen.contains(read) {
            continue;
        }
        seen.push(*read);
        if let Some(rival) = wildcards.iter().find(|w| w.constraint.overlaps(&wildcard.constraint)) {
            return Err(Error::AmbiguousContentModel {
                type_name: owner.to_string(),
                first: rival.describe(),
                second: wildcard.describe(),
            });
        }
        wildcards.push(wildcard);
    }
    Ok(())
}

/// Sorted epsilon closure of a set of NFA states
fn closure(nfa: &Nfa, seeds: Vec<usize>) -> Vec<usize> {
    let mut set = BTreeSet::new();
    let mut stack = seeds;
    while let Some(state) = stack.pop() {
        if set.insert(state) {
            stack.extend(nfa.states[state].epsilon.iter().copied());
        }
    }
    set.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automata::nfa::NfaState;
    use crate::automata::Automaton;
    use crate::components::{ElementId, NamespaceConstraint, ProcessContents, Wildcard};
    use crate::namespaces::QName;

    fn element(name: &str, id: usize) -> Symbol {
        Symbol::Element {
            name: QName::local(name),
            element: ElementId::from_index(id),
        }
    }

    #[test]
    fn test_closure_follows_epsilon_chains() {
        let mut states = vec![NfaState::default(); 4];
        states[0].epsilon = vec![1];
        states[1].epsilon = vec![2, 0];
        let nfa = Nfa {
            states,
            start: 0,
            accept: 3,
        };
        assert_eq!(closure(&nfa, vec![0]), vec![0, 1, 2]);
        assert_eq!(closure(&nfa, vec![3]), vec![3]);
    }

    #[test]
    fn test_overlapping_wildcard() {
        // (a b) | (##any c): after 'a' both continuations stay open.
        let alphabet = vec![
            element("a", 0),
            element("b", 1),
            Symbol::Wildcard {
                wildcard: Wildcard::new(NamespaceConstraint::Any, ProcessContents::Skip),
            },
            element("c", 2),
        ];
        let mut states = vec![NfaState::default(); 6];
        states[0].moves = vec![(0, 1), (2, 3)];
        states[1].moves = vec![(1, 5)];
        states[3].moves = vec![(3, 5)];
        let nfa = Nfa {
            states,
            start: 0,
            accept: 5,
        };
        let dfa = determinize(&nfa, &alphabet, &Limits::default(), "test").unwrap();
        let automaton = Automaton {
            alphabet,
            states: dfa,
            start: 0,
        };
        let a = QName::local("a");
        let b = QName::local("b");
        let c = QName::local("c");
        let z = QName::local("z");
        assert!(automaton.accepts([&a, &b]));
        assert!(automaton.accepts([&a, &c]));
        assert!(automaton.accepts([&z, &c]));
        assert!(!automaton.accepts([&z, &b]));
    }

    fn wildcard(constraint: NamespaceConstraint) -> Symbol {
        Symbol::Wildcard {
            wildcard: Wildcard::new(constraint, ProcessContents::Skip),
        }
    }

    #[test]
    fn test_wildcard_reader_recorded() {
        // a, then ##any: a second 'a' is read by the wildcard.
        let alphabet = vec![element("a", 0), wildcard(NamespaceConstraint::Any)];
        let mut states = vec![NfaState::default(); 3];
        states[0].moves = vec![(0, 1)];
        states[1].moves = vec![(1, 2)];
        let nfa = Nfa {
            states,
            start: 0,
            accept: 2,
        };
        let dfa = determinize(&nfa, &alphabet, &Limits::default(), "test").unwrap();
        let automaton = Automaton {
            alphabet,
            states: dfa,
            start: 0,
        };
        let a = QName::local("a");
        let (after_first, first) = automaton.step(0, &a).unwrap();
        assert!(matches!(first, Symbol::Element { .. }));
        let (end, second) = automaton.step(after_first, &a).unwrap();
        assert!(matches!(second, Symbol::Wildcard { .. }));
        assert!(automaton.is_accepting(end));
    }

    #[test]
    fn test_competing_wildcards_rejected() {
        // (##other x) | (##any y) from one state
        let alphabet = vec![
            wildcard(NamespaceConstraint::Other(Some("urn:t".into()))),
            wildcard(NamespaceConstraint::Any),
        ];
        let mut states = vec![NfaState::default(); 3];
        states[0].moves = vec![(0, 1), (1, 2)];
        let nfa = Nfa {
            states,
            start: 0,
            accept: 1,
        };
        let result = determinize(&nfa, &alphabet, &Limits::default(), "test");
        assert!(matches!(result, Err(Error::AmbiguousContentModel { .. })));
    }

    #[test]
    fn test_disjoint_wildcards_allowed() {
        let local: std::collections::BTreeSet<Option<String>> = [None].into_iter().collect();
        let foreign: std::collections::BTreeSet<Option<String>> = [Some("urn:f".to_string())].into_iter().collect();
        let alphabet = vec![
            wildcard(NamespaceConstraint::Enumeration(local)),
            wildcard(NamespaceConstraint::Enumeration(foreign)),
        ];
        let mut states = vec![NfaState::default(); 3];
        states[0].moves = vec![(0, 1), (1, 2)];
        let nfa = Nfa {
            states,
            start: 0,
            accept: 2,
        };
        let dfa = determinize(&nfa, &alphabet, &Limits::default(), "test").unwrap();
        let automaton = Automaton {
            alphabet,
            states: dfa,
            start: 0,
        };
        assert!(automaton.accepts([&QName::namespaced("urn:f", "z")]));
        assert!(!automaton.accepts([&QName::local("z")]));
    }

    #[test]
    fn test_state_limit() {
        let mut states = vec![NfaState::default(); 4];
        states[0].moves = vec![(0, 1)];
        states[1].moves = vec![(0, 2)];
        states[2].moves = vec![(0, 3)];
        let nfa = Nfa {
            states,
            start: 0,
            accept: 3,
        };
        let limits = Limits {
            max_automaton_states: 2,
            ..Limits::default()
        };
        let result = determinize(&nfa, &[element("a", 0)], &limits, "test");
        assert!(matches!(result, Err(Error::LimitExceeded(_))));
    }
}
