// States and arcs of a frozen transducer graph.

use crate::output::Output;

/// Identity of a frozen state.
///
/// For an in-memory [`Fst`](crate::fst::Fst) this is an index into its state
/// arena; for encoded transducers it is the absolute byte offset of the
/// state's record. In both cases every arc target is strictly lower than the
/// address of the state it leaves, which keeps the graph acyclic.
pub type Addr = u64;

/// A labelled transition carrying part of a key's output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Arc<O> {
    pub symbol: char,
    pub output: O,
    pub target: Addr,
}

/// A frozen state.
///
/// Arcs are sorted by symbol and symbols are unique within a state.
/// Two states are equivalent iff they compare equal: equality covers the
/// final flag, the final output and every `(symbol, output, target)` triple,
/// which is exactly the signature the builder hash-conses on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct State<O> {
    pub is_final: bool,
    pub final_output: O,
    pub arcs: Vec<Arc<O>>,
}

impl<O: Output> State<O> {
    /// A non-final state without arcs (the root of an empty transducer).
    pub fn empty() -> Self {
        Self {
            is_final: false,
            final_output: O::zero(),
            arcs: Vec::new(),
        }
    }

    /// Binary search for the arc labelled `symbol`.
    #[inline]
    pub fn find_arc(&self, symbol: char) -> Option<&Arc<O>> {
        self.arcs
            .binary_search_by(|arc| arc.symbol.cmp(&symbol))
            .ok()
            .map(|i| &self.arcs[i])
    }
}
