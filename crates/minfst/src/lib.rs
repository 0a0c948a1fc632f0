//! Minimal acyclic finite state transducers over sorted string keys.
//!
//! A transducer maps every key of a sorted set to an output value, sharing
//! both prefixes and suffixes between keys. Construction is a single
//! streaming pass over keys in ascending order; the result can be kept in
//! memory, serialized, or written record by record to a [`storage::Storage`]
//! and queried lazily from there.
//!
//! # Architecture
//!
//! - [`output`] -- Output algebra (zero, add, common prefix, subtract)
//! - [`state`] -- States and arcs of the frozen graph
//! - [`builder`] -- Streaming minimization of sorted `(key, output)` pairs
//! - [`format`] -- File framing: magic, format code and metadata header
//! - [`codec`] -- Per-record encoding in the default and compressed formats
//! - [`storage`] -- Addressable byte resources (memory and file backed)
//! - [`fst`] -- Fully materialized in-memory transducer
//! - [`persistent`] -- Lazily decoded transducer over a storage resource
//! - [`matcher`] -- Matching capability used to drive searches
//! - [`nfa`], [`dfa`] -- Wildcard compilation and subset construction
//! - [`traverse`] -- Lookup, lock-step search and dot rendering
//!
//! # Example
//!
//! ```
//! use minfst::fst::Fst;
//! use minfst::matcher::WildcardMatcher;
//!
//! let fst = Fst::from_sorted_iter([("bar", 1u64), ("baz", 2), ("foo", 3)]).unwrap();
//! assert_eq!(fst.try_match("baz"), Some(2));
//!
//! let hits: Vec<_> = fst
//!     .search(WildcardMatcher::new("ba?", 16))
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! assert_eq!(hits, vec![("bar".to_string(), 1), ("baz".to_string(), 2)]);
//! ```

pub mod builder;
pub mod codec;
pub mod config;
pub mod dfa;
pub mod format;
pub mod fst;
pub mod matcher;
pub mod nfa;
pub mod output;
pub mod persistent;
pub mod state;
pub mod storage;
pub mod traverse;

pub use builder::FstBuilder;
pub use config::BuilderConfig;
pub use format::Format;
pub use fst::Fst;
pub use matcher::{AnyMatcher, Matcher, WildcardMatcher};
pub use output::Output;
pub use persistent::PersistentFst;
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use traverse::{Graph, Search};

/// Error type for building, encoding, decoding and querying transducers.
#[derive(Debug, thiserror::Error)]
pub enum FstError {
    #[error("key {key:?} is not strictly greater than the previous key {previous:?}")]
    OutOfOrder { previous: String, key: String },
    #[error("invalid magic in FST header")]
    InvalidMagic,
    #[error("unsupported FST format code {0:#04x}")]
    UnsupportedFormat(u8),
    #[error("format mismatch: expected {expected:?}, found {actual:?}")]
    FormatMismatch { expected: Format, actual: Format },
    #[error("data too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: u64, actual: u64 },
    #[error("corrupt FST data: {0}")]
    Corrupt(String),
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
