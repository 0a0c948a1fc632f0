// Fully materialized in-memory transducer.

use std::borrow::Cow;
use std::io::Write;

use hashbrown::HashMap;

use crate::FstError;
use crate::builder::{BuildSummary, FstBuilder, NodeWriter, StorageWriter};
use crate::format::{Format, parse_header};
use crate::matcher::{AnyMatcher, Matcher};
use crate::output::Output;
use crate::persistent::PersistentFst;
use crate::state::{Addr, State};
use crate::storage::{MemoryStorage, Storage};
use crate::traverse::{self, Graph, Search};

/// A frozen transducer held as an arena of states.
///
/// Addresses are arena indices, and every arc points to a lower index than
/// the state it leaves, so the arena is already in the children-first order
/// the encoders need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fst<O> {
    states: Vec<State<O>>,
    root: Addr,
    term_count: u64,
    max_key_length: u32,
}

impl<O: Output> Fst<O> {
    pub(crate) fn from_parts(states: Vec<State<O>>, summary: BuildSummary) -> Self {
        Self {
            states,
            root: summary.root,
            term_count: summary.term_count,
            max_key_length: summary.max_key_length,
        }
    }

    /// Build from `(key, output)` pairs in strictly ascending key order.
    pub fn from_sorted_iter<K, I>(iter: I) -> Result<Self, FstError>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, O)>,
    {
        let mut builder = FstBuilder::memory();
        builder.extend_iter(iter)?;
        builder.finish()
    }

    /// Copy every state reachable from the root of `graph` into an arena.
    ///
    /// Term count and maximum key length are recomputed from the graph.
    pub fn from_graph<G: Graph<O> + ?Sized>(graph: &G) -> Result<Self, FstError> {
        struct Pending<'g, O: Output> {
            addr: Addr,
            state: Cow<'g, State<O>>,
            next_arc: usize,
        }

        let mut index: HashMap<Addr, Addr> = HashMap::new();
        let mut states: Vec<State<O>> = Vec::new();
        // Per arena index: keys accepted below the state, and the longest one.
        let mut terms: Vec<u64> = Vec::new();
        let mut longest: Vec<Option<u32>> = Vec::new();

        let root = graph.root();
        let mut stack = vec![Pending {
            addr: root,
            state: graph.load(root)?,
            next_arc: 0,
        }];

        'outer: while let Some(top) = stack.last_mut() {
            while top.next_arc < top.state.arcs.len() {
                let target = top.state.arcs[top.next_arc].target;
                top.next_arc += 1;
                if index.contains_key(&target) {
                    continue;
                }
                if target >= top.addr {
                    return Err(FstError::Corrupt(format!(
                        "arc of state {} points forward to {target}",
                        top.addr
                    )));
                }
                let state = graph.load(target)?;
                stack.push(Pending {
                    addr: target,
                    state,
                    next_arc: 0,
                });
                continue 'outer;
            }

            let Some(done) = stack.pop() else {
                break;
            };
            let mut state = done.state.into_owned();
            let mut count = u64::from(state.is_final);
            let mut depth = state.is_final.then_some(0u32);
            for arc in &mut state.arcs {
                let child = *index.get(&arc.target).ok_or_else(|| {
                    FstError::Corrupt(format!("state {} was not materialized", arc.target))
                })?;
                arc.target = child;
                let child = child as usize;
                count = count.saturating_add(terms[child]);
                if let Some(child_depth) = longest[child] {
                    depth = depth.max(Some(child_depth.saturating_add(1)));
                }
            }
            index.insert(done.addr, states.len() as Addr);
            states.push(state);
            terms.push(count);
            longest.push(depth);
        }

        let root = states.len() as Addr - 1;
        Ok(Self {
            term_count: terms.last().copied().unwrap_or(0),
            max_key_length: longest.last().copied().flatten().unwrap_or(0),
            states,
            root,
        })
    }

    /// Decode a default-format image.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FstError> {
        Self::load_expecting(data, Format::Default)
    }

    /// Decode a compressed-format image.
    pub fn from_bytes_compressed(data: &[u8]) -> Result<Self, FstError> {
        Self::load_expecting(data, Format::Compressed)
    }

    /// Decode an image in either format, dispatching on its format code.
    pub fn load(data: &[u8]) -> Result<Self, FstError> {
        PersistentFst::open(MemoryStorage::from_bytes(data))?.to_fst()
    }

    fn load_expecting(data: &[u8], expected: Format) -> Result<Self, FstError> {
        let actual = parse_header(data)?.format;
        if actual != expected {
            return Err(FstError::FormatMismatch { expected, actual });
        }
        Self::load(data)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, FstError> {
        self.to_bytes_with(Format::Default)
    }

    pub fn to_bytes_compressed(&self) -> Result<Vec<u8>, FstError> {
        self.to_bytes_with(Format::Compressed)
    }

    pub fn to_bytes_with(&self, format: Format) -> Result<Vec<u8>, FstError> {
        Ok(self.write_to(MemoryStorage::new(), format)?.into_inner())
    }

    /// Encode into an empty `storage` and return it flushed.
    pub fn write_to<S: Storage>(&self, storage: S, format: Format) -> Result<S, FstError> {
        let mut writer = StorageWriter::new(storage, format)?;
        let mut addrs: Vec<Addr> = Vec::with_capacity(self.states.len());
        for state in &self.states {
            let mut encoded = state.clone();
            for arc in &mut encoded.arcs {
                arc.target = addrs[arc.target as usize];
            }
            addrs.push(NodeWriter::<O>::write_state(&mut writer, &encoded)?);
        }
        let summary = BuildSummary {
            root: addrs[self.root as usize],
            term_count: self.term_count,
            max_key_length: self.max_key_length,
            state_count: u32::try_from(self.states.len()).unwrap_or(u32::MAX),
        };
        NodeWriter::<O>::finish(writer, summary)
    }

    pub fn root(&self) -> Addr {
        self.root
    }

    /// State at arena index `addr`.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not an address of this transducer.
    pub fn state(&self, addr: Addr) -> &State<O> {
        &self.states[addr as usize]
    }

    pub fn states(&self) -> &[State<O>] {
        &self.states
    }

    /// Number of keys.
    pub fn len(&self) -> u64 {
        self.term_count
    }

    pub fn is_empty(&self) -> bool {
        self.term_count == 0
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn max_key_length(&self) -> u32 {
        self.max_key_length
    }

    /// Output of `key`, or `None` if it is not in the transducer.
    pub fn try_match(&self, key: &str) -> Option<O> {
        let mut state = self.state(self.root);
        let mut output = O::zero();
        for symbol in key.chars() {
            let arc = state.find_arc(symbol)?;
            output = output.add(&arc.output);
            state = self.state(arc.target);
        }
        state.is_final.then(|| output.add(&state.final_output))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.try_match(key).is_some()
    }

    /// Keys accepted by `matcher`, in ascending order, with their outputs.
    pub fn search<M: Matcher>(&self, matcher: M) -> Search<'_, O, Self, M> {
        Search::new(self, matcher)
    }

    /// Every key in ascending order.
    pub fn iter(&self) -> Search<'_, O, Self, AnyMatcher> {
        self.search(AnyMatcher)
    }

    pub fn write_dot(&self, out: &mut dyn Write) -> Result<(), FstError> {
        traverse::write_dot(self, out)
    }
}

impl<O: Output> Graph<O> for Fst<O> {
    fn root(&self) -> Addr {
        self.root
    }

    fn load(&self, addr: Addr) -> Result<Cow<'_, State<O>>, FstError> {
        self.states
            .get(addr as usize)
            .map(Cow::Borrowed)
            .ok_or_else(|| FstError::Corrupt(format!("no state at index {addr}")))
    }

    fn key_length_limit(&self) -> usize {
        self.max_key_length as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::WildcardMatcher;

    fn words() -> Fst<u64> {
        Fst::from_sorted_iter([
            ("mon", 1u64),
            ("monday", 2),
            ("thursday", 5),
            ("tues", 3),
            ("tuesday", 4),
        ])
        .unwrap()
    }

    fn pairs(fst: &Fst<u64>) -> Vec<(String, u64)> {
        fst.iter().collect::<Result<_, _>>().unwrap()
    }

    #[test]
    fn metadata() {
        let fst = words();
        assert_eq!(fst.len(), 5);
        assert!(!fst.is_empty());
        assert_eq!(fst.max_key_length(), 8);
        assert!(fst.contains("tues"));
        assert!(!fst.contains("tue"));
    }

    #[test]
    fn default_bytes_roundtrip() {
        let fst = words();
        let bytes = fst.to_bytes().unwrap();
        assert_eq!(&bytes[..7], b"FST-01D");
        let decoded = Fst::<u64>::from_bytes(&bytes).unwrap();
        assert_eq!(pairs(&decoded), pairs(&fst));
        assert_eq!(decoded.state_count(), fst.state_count());
        assert_eq!(decoded.len(), fst.len());
        assert_eq!(decoded.max_key_length(), fst.max_key_length());
    }

    #[test]
    fn compressed_bytes_are_smaller() {
        let fst = words();
        let default = fst.to_bytes().unwrap();
        let compressed = fst.to_bytes_compressed().unwrap();
        assert_eq!(compressed[6], b'C');
        assert!(compressed.len() < default.len());
        let decoded = Fst::<u64>::from_bytes_compressed(&compressed).unwrap();
        assert_eq!(pairs(&decoded), pairs(&fst));
    }

    #[test]
    fn format_mismatch_is_reported() {
        let fst = words();
        let compressed = fst.to_bytes_compressed().unwrap();
        assert!(matches!(
            Fst::<u64>::from_bytes(&compressed),
            Err(FstError::FormatMismatch {
                expected: Format::Default,
                actual: Format::Compressed
            })
        ));
        assert_eq!(pairs(&Fst::<u64>::load(&compressed).unwrap()), pairs(&fst));
    }

    #[test]
    fn reencoding_is_stable() {
        let fst = words();
        let once = fst.to_bytes_compressed().unwrap();
        let decoded = Fst::<u64>::load(&once).unwrap();
        assert_eq!(pairs(&decoded), pairs(&fst));
        assert_eq!(decoded.state_count(), fst.state_count());

        let twice = decoded.to_bytes_compressed().unwrap();
        let thrice = Fst::<u64>::load(&twice).unwrap().to_bytes_compressed().unwrap();
        assert_eq!(twice, thrice);
    }

    #[test]
    fn truncated_image_is_rejected() {
        let bytes = words().to_bytes().unwrap();
        for cut in [3, 20, bytes.len() - 1] {
            assert!(Fst::<u64>::load(&bytes[..cut]).is_err(), "cut at {cut}");
        }
    }

    #[test]
    fn header_mismatch_is_rejected() {
        let mut bytes = words().to_bytes().unwrap();
        // term_count lives right after the root address.
        bytes[15] = 9;
        assert!(matches!(
            Fst::<u64>::load(&bytes),
            Err(FstError::Corrupt(_))
        ));
    }

    #[test]
    fn search_with_wildcards() {
        let fst = words();
        let hits: Vec<_> = fst
            .search(WildcardMatcher::new("*day", 16))
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(
            hits,
            vec![
                ("monday".to_string(), 2),
                ("thursday".to_string(), 5),
                ("tuesday".to_string(), 4)
            ]
        );
    }

    #[test]
    fn signed_outputs_roundtrip() {
        let fst = Fst::from_sorted_iter([("a", -5i64), ("b", 7), ("c", i64::MIN)]).unwrap();
        let decoded =
            Fst::<i64>::from_bytes_compressed(&fst.to_bytes_compressed().unwrap()).unwrap();
        assert_eq!(decoded.try_match("a"), Some(-5));
        assert_eq!(decoded.try_match("c"), Some(i64::MIN));
        let decoded = Fst::<i64>::from_bytes(&fst.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.try_match("b"), Some(7));
    }
}
