// Wildcard patterns compiled to epsilon-NFAs.
//
// `*` matches any run of symbols (including none), `?` exactly one symbol,
// and every other character only itself.

/// Input accepted by an NFA edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Symbol(char),
    /// Any single symbol.
    Any,
}

impl Label {
    #[inline]
    pub fn accepts(self, symbol: char) -> bool {
        match self {
            Label::Symbol(expected) => expected == symbol,
            Label::Any => true,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct NfaState {
    edges: Vec<(Label, usize)>,
    epsilons: Vec<usize>,
}

/// Nondeterministic automaton with epsilon moves and a single accepting state.
#[derive(Debug, Clone)]
pub struct Nfa {
    states: Vec<NfaState>,
    accept: usize,
}

impl Nfa {
    pub const START: usize = 0;

    /// Mirror `pattern` one state per pattern position.
    ///
    /// A literal or `?` adds a consuming edge to a fresh state; `*` adds an
    /// epsilon edge to a fresh state that loops on any symbol.
    pub fn wildcard(pattern: &str) -> Self {
        let mut nfa = Self {
            states: vec![NfaState::default()],
            accept: Self::START,
        };
        let mut current = Self::START;
        for c in pattern.chars() {
            let next = nfa.add_state();
            match c {
                '*' => {
                    nfa.states[current].epsilons.push(next);
                    nfa.states[next].edges.push((Label::Any, next));
                }
                '?' => nfa.states[current].edges.push((Label::Any, next)),
                literal => nfa.states[current].edges.push((Label::Symbol(literal), next)),
            }
            current = next;
        }
        nfa.accept = current;
        nfa
    }

    fn add_state(&mut self) -> usize {
        self.states.push(NfaState::default());
        self.states.len() - 1
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn is_accepting(&self, state: usize) -> bool {
        state == self.accept
    }

    /// Extend `set` with everything reachable by epsilon moves.
    /// The result is sorted and deduplicated.
    pub fn epsilon_closure(&self, set: &mut Vec<usize>) {
        let mut stack = set.clone();
        while let Some(state) = stack.pop() {
            for &next in &self.states[state].epsilons {
                if !set.contains(&next) {
                    set.push(next);
                    stack.push(next);
                }
            }
        }
        set.sort_unstable();
        set.dedup();
    }

    /// Epsilon-closed successors of `set` on `symbol`.
    ///
    /// With `None` only [`Label::Any`] edges are followed: the move on a
    /// symbol that no literal edge of `set` names.
    pub fn step(&self, set: &[usize], symbol: Option<char>) -> Vec<usize> {
        let mut next = Vec::new();
        for &state in set {
            for &(label, target) in &self.states[state].edges {
                let taken = match symbol {
                    Some(symbol) => label.accepts(symbol),
                    None => label == Label::Any,
                };
                if taken {
                    next.push(target);
                }
            }
        }
        self.epsilon_closure(&mut next);
        next
    }

    /// Literal symbols labelling edges out of `set`, sorted.
    pub fn literals(&self, set: &[usize]) -> Vec<char> {
        let mut symbols: Vec<char> = set
            .iter()
            .flat_map(|&state| &self.states[state].edges)
            .filter_map(|&(label, _)| match label {
                Label::Symbol(symbol) => Some(symbol),
                Label::Any => None,
            })
            .collect();
        symbols.sort_unstable();
        symbols.dedup();
        symbols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(nfa: &Nfa) -> Vec<usize> {
        let mut set = vec![Nfa::START];
        nfa.epsilon_closure(&mut set);
        set
    }

    #[test]
    fn literal_pattern_is_a_chain() {
        let nfa = Nfa::wildcard("ab");
        assert_eq!(nfa.state_count(), 3);
        let s0 = start(&nfa);
        assert_eq!(s0, vec![0]);
        assert_eq!(nfa.literals(&s0), vec!['a']);
        let s1 = nfa.step(&s0, Some('a'));
        assert_eq!(s1, vec![1]);
        assert!(nfa.step(&s0, Some('b')).is_empty());
        assert!(nfa.step(&s0, None).is_empty());
        let s2 = nfa.step(&s1, Some('b'));
        assert!(nfa.is_accepting(s2[0]));
    }

    #[test]
    fn star_is_an_epsilon_into_a_loop() {
        let nfa = Nfa::wildcard("*a");
        let s0 = start(&nfa);
        assert_eq!(s0, vec![0, 1]);
        assert_eq!(nfa.step(&s0, Some('a')), vec![1, 2]);
        assert_eq!(nfa.step(&s0, Some('z')), vec![1]);
        assert_eq!(nfa.step(&s0, None), vec![1]);
    }

    #[test]
    fn question_mark_takes_any_one_symbol() {
        let nfa = Nfa::wildcard("?");
        let s0 = start(&nfa);
        assert!(!nfa.is_accepting(s0[0]));
        let s1 = nfa.step(&s0, Some('\u{1F600}'));
        assert_eq!(s1, vec![1]);
        assert!(nfa.is_accepting(1));
        assert!(nfa.step(&s1, None).is_empty());
    }

    #[test]
    fn empty_pattern_accepts_only_the_empty_key() {
        let nfa = Nfa::wildcard("");
        assert_eq!(nfa.state_count(), 1);
        assert!(nfa.is_accepting(Nfa::START));
        assert!(nfa.step(&start(&nfa), None).is_empty());
    }
}
