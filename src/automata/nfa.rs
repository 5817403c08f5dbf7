//! Thompson construction of content NFAs

use crate::components::{Compositor, ElementId, Occurs, Wildcard};
use crate::derivation::{ResolvedParticle, ResolvedTerm, SubstitutionGroups};
use crate::error::Result;
use crate::limits::Limits;
use crate::registry::SchemaArena;

use super::Symbol;

/// An NFA state: epsilon edges and symbol moves
#[derive(Debug, Clone, Default)]
pub struct NfaState {
    /// Epsilon successors
    pub epsilon: Vec<usize>,
    /// `(symbol, target)` moves
    pub moves: Vec<(usize, usize)>,
}

/// Nondeterministic content automaton with one start and one final state
#[derive(Debug, Clone)]
pub struct Nfa {
    /// States
    pub states: Vec<NfaState>,
    /// Initial state
    pub start: usize,
    /// The only accepting state
    pub accept: usize,
}

impl Nfa {
    /// Number of states
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Check if the NFA has no state
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Fragment {
    start: usize,
    end: usize,
}

/// Builds the NFA of one particle tree, collecting its alphabet
pub struct NfaBuilder<'a> {
    arena: &'a SchemaArena,
    substitutions: &'a SubstitutionGroups,
    limits: &'a Limits,
    owner: &'a str,
    alphabet: Vec<Symbol>,
    states: Vec<NfaState>,
}

impl<'a> NfaBuilder<'a> {
    /// Create a builder for the content of `owner`
    pub fn new(
        arena: &'a SchemaArena,
        substitutions: &'a SubstitutionGroups,
        limits: &'a Limits,
        owner: &'a str,
    ) -> Self {
        Self {
            arena,
            substitutions,
            limits,
            owner,
            alphabet: Vec::new(),
            states: Vec::new(),
        }
    }

    /// Build the NFA of a root particle; None accepts only empty content
    pub fn build(&mut self, root: Option<&ResolvedParticle>) -> Result<Nfa> {
        let fragment = match root {
            Some(particle) => self.particle(particle)?,
            None => {
                let state = self.state()?;
                Fragment { start: state, end: state }
            }
        };
        Ok(Nfa {
            states: std::mem::take(&mut self.states),
            start: fragment.start,
            accept: fragment.end,
        })
    }

    /// The symbols collected while building
    pub fn into_alphabet(self) -> Vec<Symbol> {
        self.alphabet
    }

    fn state(&mut self) -> Result<usize> {
        self.limits.check_automaton_states(self.states.len() + 1, self.owner)?;
        self.states.push(NfaState::default());
        Ok(self.states.len() - 1)
    }

    fn epsilon(&mut self, from: usize, to: usize) {
        self.states[from].epsilon.push(to);
    }

    /// Unroll occurrence bounds around fresh copies of the term
    fn particle(&mut self, particle: &ResolvedParticle) -> Result<Fragment> {
        let Occurs { min, max } = particle.occurs;
        let start = self.state()?;
        let mut current = start;

        for i in 0..min {
            let copy = self.term(&particle.term)?;
            self.epsilon(current, copy.start);
            if max.is_none() && i + 1 == min {
                self.epsilon(copy.end, copy.start);
            }
            current = copy.end;
        }

        match max {
            None if min == 0 => {
                let copy = self.term(&particle.term)?;
                self.epsilon(current, copy.start);
                self.epsilon(copy.end, current);
                Ok(Fragment { start, end: current })
            }
            None => Ok(Fragment { start, end: current }),
            Some(max) => {
                let end = self.state()?;
                self.epsilon(current, end);
                for _ in min..max {
                    let copy = self.term(&particle.term)?;
                    self.epsilon(current, copy.start);
                    current = copy.end;
                    self.epsilon(current, end);
                }
                Ok(Fragment { start, end })
            }
        }
    }

    fn term(&mut self, term: &ResolvedTerm) -> Result<Fragment> {
        match term {
            ResolvedTerm::Element(element) => {
                let start = self.state()?;
                let end = self.state()?;
                for symbol in self.element_symbols(*element) {
                    self.states[start].moves.push((symbol, end));
                }
                Ok(Fragment { start, end })
            }
            ResolvedTerm::Wildcard(wildcard) => {
                let start = self.state()?;
                let end = self.state()?;
                let symbol = self.wildcard_symbol(wildcard);
                self.states[start].moves.push((symbol, end));
                Ok(Fragment { start, end })
            }
            ResolvedTerm::Group {
                compositor: Compositor::Sequence,
                particles,
            } => {
                let start = self.state()?;
                let mut current = start;
                for particle in particles {
                    let fragment = self.particle(particle)?;
                    self.epsilon(current, fragment.start);
                    current = fragment.end;
                }
                Ok(Fragment { start, end: current })
            }
            ResolvedTerm::Group {
                compositor: Compositor::Choice,
                particles,
            } => {
                let start = self.state()?;
                let end = self.state()?;
                for particle in particles {
                    let fragment = self.particle(particle)?;
                    self.epsilon(start, fragment.start);
                    self.epsilon(fragment.end, end);
                }
                Ok(Fragment { start, end })
            }
            ResolvedTerm::Group {
                compositor: Compositor::All,
                particles,
            } => self.all(particles),
        }
    }

    /// Counting automaton over the subsets of consumed children
    ///
    /// Lattice state `mask` has consumed the children whose bits are set.
    /// Each child is read at most once; the exit opens when every required
    /// child is in the mask. The NFA holds `2^n + 1` states for `n` members.
    fn all(&mut self, particles: &[ResolvedParticle]) -> Result<Fragment> {
        let members: Vec<&ResolvedParticle> = particles.iter().filter(|p| !p.is_empty()).collect();
        self.limits.check_all_group_members(members.len(), self.owner)?;

        let required = members
            .iter()
            .enumerate()
            .filter(|(_, p)| p.occurs.min > 0)
            .fold(0usize, |mask, (i, _)| mask | (1 << i));
        let size = 1usize << members.len();
        self.limits.check_automaton_states(self.states.len() + size, self.owner)?;

        // Element and wildcard members move straight between lattice states.
        let reads: Vec<Option<Vec<usize>>> = members
            .iter()
            .map(|member| match &member.term {
                ResolvedTerm::Element(element) => Some(self.element_symbols(*element)),
                ResolvedTerm::Wildcard(wildcard) => Some(vec![self.wildcard_symbol(wildcard)]),
                ResolvedTerm::Group { .. } => None,
            })
            .collect();

        let lattice = (0..size).map(|_| self.state()).collect::<Result<Vec<_>>>()?;
        let end = self.state()?;
        for mask in 0..size {
            if mask & required == required {
                self.epsilon(lattice[mask], end);
            }
            for (i, symbols) in reads.iter().enumerate() {
                if mask & (1 << i) != 0 {
                    continue;
                }
                let next = lattice[mask | (1 << i)];
                match symbols {
                    Some(symbols) => {
                        for symbol in symbols {
                            self.states[lattice[mask]].moves.push((*symbol, next));
                        }
                    }
                    None => {
                        let copy = self.term(&members[i].term)?;
                        self.epsilon(lattice[mask], copy.start);
                        self.epsilon(copy.end, next);
                    }
                }
            }
        }
        Ok(Fragment {
            start: lattice[0],
            end,
        })
    }

    /// Symbols of an element term: the declaration and its substitution
    /// group members, abstract declarations left out
    fn element_symbols(&mut self, head: ElementId) -> Vec<usize> {
        let arena = self.arena;
        let candidates: Vec<ElementId> = std::iter::once(head)
            .chain(self.substitutions.members(head).iter().copied())
            .collect();

        let mut symbols = Vec::with_capacity(candidates.len());
        for element in candidates {
            let decl = arena.element(element);
            if decl.is_abstract {
                continue;
            }
            let Some(name) = decl.info.name.clone() else { continue };
            let symbol = match self
                .alphabet
                .iter()
                .position(|s| matches!(s, Symbol::Element { name: n, .. } if *n == name))
            {
                Some(index) => index,
                None => {
                    self.alphabet.push(Symbol::Element { name, element });
                    self.alphabet.len() - 1
                }
            };
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
        symbols
    }

    fn wildcard_symbol(&mut self, wildcard: &Wildcard) -> usize {
        match self
            .alphabet
            .iter()
            .position(|s| matches!(s, Symbol::Wildcard { wildcard: w } if w == wildcard))
        {
            Some(index) => index,
            None => {
                self.alphabet.push(Symbol::Wildcard {
                    wildcard: wildcard.clone(),
                });
                self.alphabet.len() - 1
            }
        }
    }
}
