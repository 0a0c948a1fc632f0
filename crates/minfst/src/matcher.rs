// Matching capability driving lock-step searches.

use log::debug;

use crate::dfa::Dfa;

/// A deterministic acceptor stepped one symbol at a time, with backtracking.
///
/// A search calls [`next`](Self::next) before descending into an arc and
/// [`pop`](Self::pop) when it climbs back out, so the matcher keeps a stack
/// of the states it has passed through.
pub trait Matcher {
    /// Return to the start state and forget all history.
    fn reset(&mut self);

    /// Try to consume `symbol`. On `false` the state is unchanged and the
    /// caller must not descend.
    fn next(&mut self, symbol: char) -> bool;

    /// Whether the symbols consumed so far form an accepted key.
    fn is_final(&self) -> bool;

    /// Undo the most recent successful [`next`](Self::next).
    fn pop(&mut self);
}

impl<M: Matcher + ?Sized> Matcher for &mut M {
    fn reset(&mut self) {
        (**self).reset()
    }

    fn next(&mut self, symbol: char) -> bool {
        (**self).next(symbol)
    }

    fn is_final(&self) -> bool {
        (**self).is_final()
    }

    fn pop(&mut self) {
        (**self).pop()
    }
}

impl<M: Matcher + ?Sized> Matcher for Box<M> {
    fn reset(&mut self) {
        (**self).reset()
    }

    fn next(&mut self, symbol: char) -> bool {
        (**self).next(symbol)
    }

    fn is_final(&self) -> bool {
        (**self).is_final()
    }

    fn pop(&mut self) {
        (**self).pop()
    }
}

/// Accepts every key.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyMatcher;

impl Matcher for AnyMatcher {
    fn reset(&mut self) {}

    fn next(&mut self, _symbol: char) -> bool {
        true
    }

    fn is_final(&self) -> bool {
        true
    }

    fn pop(&mut self) {}
}

/// Runs a [`Dfa`], accepting keys of at most `max_length` symbols.
#[derive(Debug, Clone)]
pub struct DfaMatcher {
    dfa: Dfa,
    max_length: usize,
    /// Visited DFA states; the last one is current.
    stack: Vec<usize>,
}

impl DfaMatcher {
    pub fn new(dfa: Dfa, max_length: usize) -> Self {
        let mut stack = Vec::with_capacity(max_length.saturating_add(1).min(1024));
        stack.push(Dfa::START);
        Self {
            dfa,
            max_length,
            stack,
        }
    }

    pub fn dfa(&self) -> &Dfa {
        &self.dfa
    }

    /// Symbols consumed since the last reset.
    pub fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    fn current(&self) -> usize {
        self.stack.last().copied().unwrap_or(Dfa::START)
    }
}

impl Matcher for DfaMatcher {
    fn reset(&mut self) {
        self.stack.clear();
        self.stack.push(Dfa::START);
    }

    fn next(&mut self, symbol: char) -> bool {
        if self.depth() >= self.max_length {
            return false;
        }
        match self.dfa.next(self.current(), symbol) {
            Some(state) => {
                self.stack.push(state);
                true
            }
            None => false,
        }
    }

    fn is_final(&self) -> bool {
        self.dfa.is_final(self.current())
    }

    fn pop(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }
}

/// Matches keys against a wildcard pattern: `*` is any run of symbols,
/// `?` any single symbol, anything else itself.
///
/// ```
/// use minfst::{Matcher, WildcardMatcher};
///
/// let mut matcher = WildcardMatcher::new("a?c", 16);
/// assert!(matcher.next('a'));
/// assert!(matcher.next('x'));
/// assert!(!matcher.next('d'));
/// assert!(matcher.next('c'));
/// assert!(matcher.is_final());
/// ```
#[derive(Debug, Clone)]
pub struct WildcardMatcher {
    pattern: String,
    inner: DfaMatcher,
}

impl WildcardMatcher {
    pub fn new(pattern: &str, max_length: usize) -> Self {
        let dfa = Dfa::wildcard(pattern);
        debug!(
            "event=wildcard_compiled pattern={:?} dfa_states={}",
            pattern,
            dfa.state_count()
        );
        Self {
            pattern: pattern.to_string(),
            inner: DfaMatcher::new(dfa, max_length),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl Matcher for WildcardMatcher {
    fn reset(&mut self) {
        self.inner.reset()
    }

    fn next(&mut self, symbol: char) -> bool {
        self.inner.next(symbol)
    }

    fn is_final(&self) -> bool {
        self.inner.is_final()
    }

    fn pop(&mut self) {
        self.inner.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_matcher_accepts_everything() {
        let mut m = AnyMatcher;
        assert!(m.is_final());
        assert!(m.next('x'));
        assert!(m.is_final());
        m.pop();
        m.reset();
    }

    #[test]
    fn wildcard_next_and_pop() {
        let mut m = WildcardMatcher::new("ab*", 8);
        assert_eq!(m.pattern(), "ab*");
        assert!(!m.is_final());
        assert!(!m.next('b'));
        assert!(m.next('a'));
        assert!(!m.is_final());
        assert!(m.next('b'));
        assert!(m.is_final());
        assert!(m.next('z'));
        assert!(m.is_final());

        m.pop();
        m.pop();
        assert!(!m.is_final());
        // A failed step leaves the state alone.
        assert!(!m.next('q'));
        assert!(m.next('b'));
        assert!(m.is_final());

        m.reset();
        assert!(!m.is_final());
        assert!(m.next('a'));
    }

    #[test]
    fn max_length_caps_depth() {
        let mut m = DfaMatcher::new(Dfa::wildcard("*"), 2);
        assert!(m.next('a'));
        assert!(m.next('b'));
        assert_eq!(m.depth(), 2);
        assert!(!m.next('c'));
        m.pop();
        assert!(m.next('c'));
    }

    #[test]
    fn pop_at_start_is_harmless() {
        let mut m = WildcardMatcher::new("a", 4);
        m.pop();
        assert!(m.next('a'));
        assert!(m.is_final());
    }

    #[test]
    fn boxed_matchers_are_matchers() {
        let mut matchers: Vec<Box<dyn Matcher>> =
            vec![Box::new(AnyMatcher), Box::new(WildcardMatcher::new("?", 4))];
        for m in &mut matchers {
            assert!(m.next('x'));
            assert!(m.is_final());
        }
    }
}
