// Streaming construction of minimal transducers from sorted keys.
//
// The builder keeps the states of the most recently inserted key unfrozen
// (one per depth, root first). Inserting a key freezes every state deeper
// than the prefix it shares with the previous key, deepest first, replacing
// each by an equivalent already-frozen state when the cache has one. Output
// shared with the new key is pushed towards the root along the common prefix
// before the new suffix is appended.

use hashbrown::HashMap;
use log::{debug, trace};

use crate::FstError;
use crate::codec::encode_state;
use crate::config::BuilderConfig;
use crate::format::{Format, FstHeader, HEADER_SIZE, placeholder_header};
use crate::fst::Fst;
use crate::output::Output;
use crate::state::{Addr, Arc, State};
use crate::storage::Storage;

/// Totals recorded while building, handed to the writer on finish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub root: Addr,
    pub term_count: u64,
    pub max_key_length: u32,
    pub state_count: u32,
}

/// Destination of frozen states.
///
/// States arrive children-first, so every arc target has already been
/// assigned an address when its source state is written.
pub trait NodeWriter<O: Output> {
    type Finished;

    /// Persist a frozen state and return its address.
    fn write_state(&mut self, state: &State<O>) -> Result<Addr, FstError>;

    fn finish(self, summary: BuildSummary) -> Result<Self::Finished, FstError>;
}

/// Collects frozen states into an arena; addresses are arena indices.
#[derive(Debug)]
pub struct MemoryWriter<O> {
    states: Vec<State<O>>,
}

impl<O: Output> NodeWriter<O> for MemoryWriter<O> {
    type Finished = Fst<O>;

    fn write_state(&mut self, state: &State<O>) -> Result<Addr, FstError> {
        self.states.push(state.clone());
        Ok((self.states.len() - 1) as Addr)
    }

    fn finish(self, summary: BuildSummary) -> Result<Fst<O>, FstError> {
        Ok(Fst::from_parts(self.states, summary))
    }
}

/// Encodes frozen states straight into a [`Storage`].
///
/// The header is written as a placeholder up front and finalized only after
/// every record has been flushed.
#[derive(Debug)]
pub struct StorageWriter<S> {
    storage: S,
    format: Format,
    buf: Vec<u8>,
}

impl<S: Storage> StorageWriter<S> {
    /// Write the placeholder header into `storage`, which must be empty.
    pub fn new(mut storage: S, format: Format) -> Result<Self, FstError> {
        if !storage.is_empty() {
            return Err(FstError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "target storage must be empty",
            )));
        }
        storage.append(&placeholder_header(format))?;
        debug_assert_eq!(storage.len(), HEADER_SIZE as u64);
        Ok(Self {
            storage,
            format,
            buf: Vec::new(),
        })
    }
}

impl<O: Output, S: Storage> NodeWriter<O> for StorageWriter<S> {
    type Finished = S;

    fn write_state(&mut self, state: &State<O>) -> Result<Addr, FstError> {
        let addr = self.storage.len();
        self.buf.clear();
        encode_state(self.format, state, addr, &mut self.buf);
        self.storage.append(&self.buf)?;
        trace!(
            "event=state_written addr={} bytes={} arcs={}",
            addr,
            self.buf.len(),
            state.arcs.len()
        );
        Ok(addr)
    }

    fn finish(mut self, summary: BuildSummary) -> Result<S, FstError> {
        self.storage.flush()?;
        let header = FstHeader {
            format: self.format,
            root: summary.root,
            term_count: summary.term_count,
            max_key_length: summary.max_key_length,
            state_count: summary.state_count,
        };
        self.storage.write_at(0, &header.to_bytes())?;
        self.storage.flush()?;
        Ok(self.storage)
    }
}

/// Arc of an unfrozen state whose target is still on the unfrozen path.
#[derive(Debug)]
struct PendingArc<O> {
    symbol: char,
    output: O,
}

#[derive(Debug)]
struct UnfrozenState<O> {
    is_final: bool,
    final_output: O,
    arcs: Vec<Arc<O>>,
    /// Arc towards the next state on the path, if any.
    last: Option<PendingArc<O>>,
}

impl<O: Output> UnfrozenState<O> {
    fn new() -> Self {
        Self {
            is_final: false,
            final_output: O::zero(),
            arcs: Vec::new(),
            last: None,
        }
    }

    /// Prefix every output leaving this state with `prefix`.
    fn prepend_output(&mut self, prefix: &O) {
        for arc in &mut self.arcs {
            arc.output = prefix.add(&arc.output);
        }
        if let Some(last) = &mut self.last {
            last.output = prefix.add(&last.output);
        }
        if self.is_final {
            self.final_output = prefix.add(&self.final_output);
        }
    }

    fn resolve_last(&mut self, target: Addr) {
        if let Some(last) = self.last.take() {
            self.arcs.push(Arc {
                symbol: last.symbol,
                output: last.output,
                target,
            });
        }
    }

    fn into_state(self) -> State<O> {
        debug_assert!(self.last.is_none(), "freezing a state with a pending arc");
        State {
            is_final: self.is_final,
            final_output: self.final_output,
            arcs: self.arcs,
        }
    }
}

/// Builds a minimal transducer from `(key, output)` pairs in strictly
/// ascending key order.
///
/// ```
/// use minfst::FstBuilder;
///
/// let mut builder = FstBuilder::memory();
/// builder.insert("Amsterdam Airport", 41198u32).unwrap();
/// builder.insert("Amsterdam Heliport", 43207).unwrap();
/// let fst = builder.finish().unwrap();
/// assert_eq!(fst.try_match("Amsterdam Heliport"), Some(43207));
/// ```
#[derive(Debug)]
pub struct FstBuilder<O: Output, W> {
    writer: W,
    config: BuilderConfig,
    /// Unfrozen path of the previous key: `unfrozen[d]` is the state at depth `d`.
    unfrozen: Vec<UnfrozenState<O>>,
    last_key: Vec<char>,
    key_buf: Vec<char>,
    /// Frozen states by structure, for reusing equivalent suffixes.
    cache: HashMap<State<O>, Addr>,
    term_count: u64,
    max_key_length: u32,
    state_count: u32,
    cache_hits: u64,
}

impl<O: Output> FstBuilder<O, MemoryWriter<O>> {
    /// Builder producing an in-memory [`Fst`].
    pub fn memory() -> Self {
        Self::memory_with_config(BuilderConfig::default())
    }

    pub fn memory_with_config(config: BuilderConfig) -> Self {
        Self::with_writer(MemoryWriter { states: Vec::new() }, config)
    }
}

impl<O: Output, S: Storage> FstBuilder<O, StorageWriter<S>> {
    /// Builder that writes each frozen state to `storage` as it is frozen,
    /// in `config.format`. `storage` must be empty.
    pub fn with_storage(storage: S, config: BuilderConfig) -> Result<Self, FstError> {
        let writer = StorageWriter::new(storage, config.format)?;
        Ok(Self::with_writer(writer, config))
    }
}

impl<O: Output, W: NodeWriter<O>> FstBuilder<O, W> {
    pub fn with_writer(writer: W, config: BuilderConfig) -> Self {
        Self {
            writer,
            config,
            unfrozen: vec![UnfrozenState::new()],
            last_key: Vec::new(),
            key_buf: Vec::new(),
            cache: HashMap::new(),
            term_count: 0,
            max_key_length: 0,
            state_count: 0,
            cache_hits: 0,
        }
    }

    /// Number of keys inserted so far.
    pub fn term_count(&self) -> u64 {
        self.term_count
    }

    /// Insert one pair. `key` must be strictly greater than the previous key
    /// in ordinal order.
    pub fn insert(&mut self, key: &str, output: O) -> Result<(), FstError> {
        let mut key_chars = std::mem::take(&mut self.key_buf);
        key_chars.clear();
        key_chars.extend(key.chars());

        if self.term_count > 0 && key_chars <= self.last_key {
            self.key_buf = key_chars;
            return Err(FstError::OutOfOrder {
                previous: self.last_key.iter().collect(),
                key: key.to_string(),
            });
        }

        let prefix_len = self
            .last_key
            .iter()
            .zip(&key_chars)
            .take_while(|(a, b)| a == b)
            .count();

        self.freeze_from(prefix_len + 1)?;
        let output = self.push_shared_output(prefix_len, output);
        self.append_suffix(&key_chars[prefix_len..], output);

        self.term_count += 1;
        self.max_key_length = self
            .max_key_length
            .max(u32::try_from(key_chars.len()).unwrap_or(u32::MAX));
        self.key_buf = std::mem::replace(&mut self.last_key, key_chars);
        Ok(())
    }

    /// Insert every pair of `iter` in order.
    pub fn extend_iter<K, I>(&mut self, iter: I) -> Result<(), FstError>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, O)>,
    {
        for (key, output) in iter {
            self.insert(key.as_ref(), output)?;
        }
        Ok(())
    }

    /// Freeze the remaining path up to the root and seal the transducer.
    pub fn finish(mut self) -> Result<W::Finished, FstError> {
        self.freeze_from(1)?;
        let root_state = self.unfrozen.pop().unwrap_or_else(UnfrozenState::new);
        let root = self.freeze(root_state)?;

        let summary = BuildSummary {
            root,
            term_count: self.term_count,
            max_key_length: self.max_key_length,
            state_count: self.state_count,
        };
        debug!(
            "event=fst_built terms={} states={} cache_hits={} max_key_length={}",
            summary.term_count, summary.state_count, self.cache_hits, summary.max_key_length
        );
        self.writer.finish(summary)
    }

    /// Freeze unfrozen states until only `depth` remain.
    fn freeze_from(&mut self, depth: usize) -> Result<(), FstError> {
        while self.unfrozen.len() > depth {
            let Some(state) = self.unfrozen.pop() else {
                break;
            };
            let addr = self.freeze(state)?;
            if let Some(parent) = self.unfrozen.last_mut() {
                parent.resolve_last(addr);
            }
        }
        Ok(())
    }

    /// Push the output shared with the common prefix towards the root.
    /// Returns what is left of `output` for the new suffix.
    fn push_shared_output(&mut self, prefix_len: usize, mut output: O) -> O {
        for depth in 0..prefix_len {
            let (head, tail) = self.unfrozen.split_at_mut(depth + 1);
            let Some(last) = head[depth].last.as_mut() else {
                continue;
            };
            let common = last.output.common_prefix(&output);
            let pushed = last.output.subtract(&common);
            output = output.subtract(&common);
            last.output = common;
            if !pushed.is_zero() {
                tail[0].prepend_output(&pushed);
            }
        }
        output
    }

    fn append_suffix(&mut self, suffix: &[char], output: O) {
        let mut output = Some(output);
        for &symbol in suffix {
            if let Some(state) = self.unfrozen.last_mut() {
                state.last = Some(PendingArc {
                    symbol,
                    output: output.take().unwrap_or_else(O::zero),
                });
            }
            self.unfrozen.push(UnfrozenState::new());
        }
        if let Some(state) = self.unfrozen.last_mut() {
            state.is_final = true;
            state.final_output = output.unwrap_or_else(O::zero);
        }
    }

    /// Replace `state` by an equivalent frozen state, or write it.
    fn freeze(&mut self, state: UnfrozenState<O>) -> Result<Addr, FstError> {
        let state = state.into_state();
        if let Some(&addr) = self.cache.get(&state) {
            self.cache_hits += 1;
            return Ok(addr);
        }

        let addr = self.writer.write_state(&state)?;
        self.state_count += 1;
        match self.config.cache_size {
            Some(0) => {}
            Some(limit) if self.cache.len() >= limit => {
                debug!(
                    "event=state_cache_evicted entries={} states={}",
                    self.cache.len(),
                    self.state_count
                );
                self.cache.clear();
                self.cache.insert(state, addr);
            }
            _ => {
                self.cache.insert(state, addr);
            }
        }
        Ok(addr)
    }
}
