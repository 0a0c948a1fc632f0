// Subset construction with a per-state default transition.

use hashbrown::HashMap;

use crate::nfa::Nfa;

/// Interns sorted NFA state sets as dense DFA state ids.
#[derive(Debug, Default)]
struct StateSets {
    ids: HashMap<Vec<usize>, usize>,
    sets: Vec<Vec<usize>>,
}

impl StateSets {
    /// Id of `set`; unseen sets get the next id.
    fn intern(&mut self, set: Vec<usize>) -> usize {
        if let Some(&id) = self.ids.get(&set) {
            return id;
        }
        let id = self.sets.len();
        self.sets.push(set.clone());
        self.ids.insert(set, id);
        id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DfaState {
    /// Explicit transitions, sorted by symbol.
    pub transitions: Vec<(char, usize)>,
    /// Target for every symbol without an explicit transition.
    pub default: Option<usize>,
    pub is_final: bool,
}

/// Deterministic automaton over `char`. State 0 is the start state.
///
/// The alphabet of each state is split into the literals some NFA edge of its
/// subset names and one default bucket for every other symbol, so `*` and
/// `?` cost one transition rather than one per symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dfa {
    states: Vec<DfaState>,
}

impl Dfa {
    pub const START: usize = 0;

    /// Determinize `nfa`.
    ///
    /// Each DFA state stands for an epsilon-closed set of NFA states. The
    /// number of sets can grow exponentially with pathological patterns.
    pub fn from_nfa(nfa: &Nfa) -> Self {
        let mut sets = StateSets::default();
        let mut start = vec![Nfa::START];
        nfa.epsilon_closure(&mut start);
        sets.intern(start);

        let mut states = Vec::new();
        let mut next_id = 0;
        while next_id < sets.sets.len() {
            let set = sets.sets[next_id].clone();
            next_id += 1;

            let default = Some(nfa.step(&set, None))
                .filter(|target| !target.is_empty())
                .map(|target| sets.intern(target));
            let mut transitions = Vec::new();
            for symbol in nfa.literals(&set) {
                let target = nfa.step(&set, Some(symbol));
                if target.is_empty() {
                    continue;
                }
                let id = sets.intern(target);
                if Some(id) != default {
                    transitions.push((symbol, id));
                }
            }
            states.push(DfaState {
                transitions,
                default,
                is_final: set.iter().any(|&s| nfa.is_accepting(s)),
            });
        }
        Self { states }
    }

    /// Compile a wildcard pattern.
    pub fn wildcard(pattern: &str) -> Self {
        Self::from_nfa(&Nfa::wildcard(pattern))
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn state(&self, id: usize) -> &DfaState {
        &self.states[id]
    }

    /// Successor of `state` on `symbol`, or `None` at a dead end.
    #[inline]
    pub fn next(&self, state: usize, symbol: char) -> Option<usize> {
        let state = &self.states[state];
        match state.transitions.binary_search_by_key(&symbol, |&(s, _)| s) {
            Ok(i) => Some(state.transitions[i].1),
            Err(_) => state.default,
        }
    }

    #[inline]
    pub fn is_final(&self, state: usize) -> bool {
        self.states[state].is_final
    }

    /// Whether the automaton accepts all of `input`.
    pub fn accepts(&self, input: &str) -> bool {
        let mut state = Self::START;
        for symbol in input.chars() {
            match self.next(state, symbol) {
                Some(next) => state = next,
                None => return false,
            }
        }
        self.is_final(state)
    }
}
