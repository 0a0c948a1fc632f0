// Lazily decoded transducer over a storage resource.

use std::borrow::Cow;
use std::cell::RefCell;
use std::io::Write;
use std::marker::PhantomData;

use log::debug;

use crate::FstError;
use crate::codec::{
    DefaultHead, decode_default_arc, decode_default_head, decode_default_symbol, decode_state,
    default_arc_size, default_head_size,
};
use crate::format::{Format, FstHeader, HEADER_SIZE, parse_header};
use crate::fst::Fst;
use crate::matcher::Matcher;
use crate::output::Output;
use crate::state::{Addr, State};
use crate::storage::Storage;
use crate::traverse::{self, Graph, Search};

/// First read size for a compressed record; doubled until the record fits.
const COMPRESSED_CHUNK: usize = 64;

/// Query engine over an encoded transducer that stays in its storage.
///
/// Records are decoded on demand. A lookup touches only the records on the
/// key's path (in the default format, only the arcs its binary search
/// probes), and a search holds at most one decoded record per level of the
/// current path.
///
/// ```
/// use minfst::{Fst, MemoryStorage, PersistentFst};
///
/// let fst = Fst::from_sorted_iter([("a", 1u32), ("b", 2)]).unwrap();
/// let storage = MemoryStorage::from_bytes(fst.to_bytes().unwrap());
/// let persistent = PersistentFst::<u32, _>::open(storage).unwrap();
/// assert_eq!(persistent.try_match("b").unwrap(), Some(2));
/// ```
#[derive(Debug)]
pub struct PersistentFst<O, S> {
    storage: RefCell<S>,
    header: FstHeader,
    /// Storage length at open time; every record lies below it.
    size: u64,
    _output: PhantomData<fn() -> O>,
}

impl<O: Output, S: Storage> PersistentFst<O, S> {
    /// Validate the header of `storage` and wrap it for querying.
    pub fn open(mut storage: S) -> Result<Self, FstError> {
        let size = storage.len();
        let mut prefix = vec![0u8; size.min(HEADER_SIZE as u64) as usize];
        storage.read_at(0, &mut prefix)?;
        let header = parse_header(&prefix)?;
        if header.root >= size {
            return Err(FstError::TooShort {
                expected: header.root + 1,
                actual: size,
            });
        }
        debug!(
            "event=fst_open format={:?} bytes={} terms={} states={} max_key_length={}",
            header.format, size, header.term_count, header.state_count, header.max_key_length
        );
        Ok(Self {
            storage: RefCell::new(storage),
            header,
            size,
            _output: PhantomData,
        })
    }

    pub fn header(&self) -> &FstHeader {
        &self.header
    }

    pub fn format(&self) -> Format {
        self.header.format
    }

    /// Number of keys, as recorded in the header.
    pub fn len(&self) -> u64 {
        self.header.term_count
    }

    pub fn is_empty(&self) -> bool {
        self.header.term_count == 0
    }

    pub fn into_inner(self) -> S {
        self.storage.into_inner()
    }

    /// Output of `key`, or `None` if it is not in the transducer.
    pub fn try_match(&self, key: &str) -> Result<Option<O>, FstError> {
        traverse::lookup(self, key)
    }

    /// Keys accepted by `matcher`, in ascending order, with their outputs.
    pub fn search<M: Matcher>(&self, matcher: M) -> Search<'_, O, Self, M> {
        Search::new(self, matcher)
    }

    pub fn write_dot(&self, out: &mut dyn Write) -> Result<(), FstError> {
        traverse::write_dot(self, out)
    }

    /// Decode every reachable record into an in-memory [`Fst`].
    ///
    /// Fails if the header metadata, when present, disagrees with the graph.
    pub fn to_fst(&self) -> Result<Fst<O>, FstError> {
        let fst = Fst::from_graph(self)?;
        let header = &self.header;
        let has_metadata =
            header.term_count != 0 || header.state_count != 0 || header.max_key_length != 0;
        if has_metadata
            && (fst.len() != header.term_count
                || fst.state_count() != header.state_count as usize
                || fst.max_key_length() != header.max_key_length)
        {
            return Err(FstError::Corrupt(format!(
                "header records {} terms, {} states, max key length {}; graph has {}, {}, {}",
                header.term_count,
                header.state_count,
                header.max_key_length,
                fst.len(),
                fst.state_count(),
                fst.max_key_length()
            )));
        }
        Ok(fst)
    }

    /// Read up to `len` bytes at `addr`, clipped to the end of storage.
    fn read(&self, addr: Addr, len: usize) -> Result<Vec<u8>, FstError> {
        let available = self.size.saturating_sub(addr);
        let mut buf = vec![0u8; (len as u64).min(available) as usize];
        if buf.is_empty() {
            return Ok(buf);
        }
        self.storage.borrow_mut().read_at(addr, &mut buf)?;
        Ok(buf)
    }

    fn check_addr(&self, addr: Addr) -> Result<(), FstError> {
        if addr < HEADER_SIZE as u64 || addr >= self.size {
            return Err(FstError::Corrupt(format!(
                "record address {addr} outside body of {} bytes",
                self.size
            )));
        }
        Ok(())
    }

    fn read_default_head(&self, addr: Addr) -> Result<DefaultHead<O>, FstError> {
        self.check_addr(addr)?;
        let data = self.read(addr, default_head_size::<O>(true))?;
        decode_default_head(&data)
    }

    fn load_default(&self, addr: Addr) -> Result<State<O>, FstError> {
        let head = self.read_default_head(addr)?;
        let size = (head.arc_count as usize)
            .checked_mul(default_arc_size::<O>())
            .and_then(|arcs| arcs.checked_add(head.size))
            .ok_or_else(|| FstError::Corrupt(format!("arc count {} overflows", head.arc_count)))?;
        let data = self.read(addr, size)?;
        Ok(decode_state(Format::Default, &data, addr)?.0)
    }

    fn load_compressed(&self, addr: Addr) -> Result<State<O>, FstError> {
        self.check_addr(addr)?;
        let available = self.size - addr;
        let mut chunk = COMPRESSED_CHUNK;
        loop {
            let data = self.read(addr, chunk)?;
            match decode_state(Format::Compressed, &data, addr) {
                Ok((state, _)) => return Ok(state),
                Err(FstError::TooShort { .. }) if (data.len() as u64) < available => {
                    chunk = chunk.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Binary search the fixed-width arcs of a default record in storage.
    fn default_transition(&self, addr: Addr, symbol: char) -> Result<Option<(O, Addr)>, FstError> {
        let head = self.read_default_head(addr)?;
        let arc_size = default_arc_size::<O>() as u64;
        let arcs_at = addr + head.size as u64;

        let (mut lo, mut hi) = (0u64, u64::from(head.arc_count));
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let at = arcs_at + mid * arc_size;
            let probe = decode_default_symbol(&self.read(at, 4)?)?;
            if probe == symbol {
                let arc = decode_default_arc::<O>(&self.read(at, arc_size as usize)?, addr)?;
                return Ok(Some((arc.output, arc.target)));
            }
            if probe < symbol {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(None)
    }
}

impl<O: Output, S: Storage> Graph<O> for PersistentFst<O, S> {
    fn root(&self) -> Addr {
        self.header.root
    }

    fn load(&self, addr: Addr) -> Result<Cow<'_, State<O>>, FstError> {
        let state = match self.header.format {
            Format::Default => self.load_default(addr)?,
            Format::Compressed => self.load_compressed(addr)?,
        };
        Ok(Cow::Owned(state))
    }

    fn key_length_limit(&self) -> usize {
        self.header.key_length_limit()
    }

    fn transition(&self, addr: Addr, symbol: char) -> Result<Option<(O, Addr)>, FstError> {
        match self.header.format {
            Format::Default => self.default_transition(addr, symbol),
            Format::Compressed => Ok(self
                .load_compressed(addr)?
                .find_arc(symbol)
                .map(|arc| (arc.output.clone(), arc.target))),
        }
    }

    fn final_output(&self, addr: Addr) -> Result<Option<O>, FstError> {
        match self.header.format {
            Format::Default => {
                let head = self.read_default_head(addr)?;
                Ok(head.is_final.then_some(head.final_output))
            }
            Format::Compressed => {
                let state = self.load_compressed(addr)?;
                Ok(state.is_final.then_some(state.final_output))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FstBuilder;
    use crate::config::BuilderConfig;
    use crate::format::placeholder_header;
    use crate::matcher::{AnyMatcher, WildcardMatcher};
    use crate::storage::MemoryStorage;

    const KEYS: [(&str, u64); 6] = [
        ("jan", 1),
        ("january", 31),
        ("jul", 7),
        ("july", 31),
        ("jun", 6),
        ("june", 30),
    ];

    fn open(format: Format) -> PersistentFst<u64, MemoryStorage> {
        let config = BuilderConfig::default().with_format(format);
        let mut builder = FstBuilder::with_storage(MemoryStorage::new(), config).unwrap();
        builder.extend_iter(KEYS).unwrap();
        PersistentFst::open(builder.finish().unwrap()).unwrap()
    }

    #[test]
    fn lookups_in_both_formats() {
        for format in [Format::Default, Format::Compressed] {
            let fst = open(format);
            assert_eq!(fst.format(), format);
            assert_eq!(fst.len(), 6);
            for (key, value) in KEYS {
                assert_eq!(fst.try_match(key).unwrap(), Some(value), "{format:?} {key}");
            }
            for missing in ["", "j", "ja", "janu", "junes", "x"] {
                assert_eq!(fst.try_match(missing).unwrap(), None, "{format:?} {missing}");
            }
        }
    }

    #[test]
    fn search_matches_in_memory_enumeration() {
        for format in [Format::Default, Format::Compressed] {
            let fst = open(format);
            let all: Vec<_> = fst.search(AnyMatcher).collect::<Result<_, _>>().unwrap();
            let expected: Vec<_> = KEYS.iter().map(|&(k, v)| (k.to_string(), v)).collect();
            assert_eq!(all, expected);

            let hits: Vec<_> = fst
                .search(WildcardMatcher::new("ju?", 8))
                .map(|r| r.unwrap().0)
                .collect();
            assert_eq!(hits, vec!["jul", "jun"]);
        }
    }

    #[test]
    fn to_fst_materializes_everything() {
        let persistent = open(Format::Compressed);
        let fst = persistent.to_fst().unwrap();
        assert_eq!(fst.len(), 6);
        assert_eq!(fst.state_count(), persistent.header().state_count as usize);
        assert_eq!(fst.try_match("july"), Some(31));
    }

    #[test]
    fn long_compressed_records_are_read_in_chunks() {
        let keys: Vec<(String, u64)> = (0..200u64)
            .map(|i| (char::from_u32(0x4E00 + i as u32).unwrap().to_string(), i * 1000))
            .collect();
        let fst = Fst::from_sorted_iter(keys.iter().map(|(k, v)| (k.as_str(), *v))).unwrap();
        let bytes = fst.to_bytes_compressed().unwrap();
        let persistent = PersistentFst::<u64, _>::open(MemoryStorage::from_bytes(bytes)).unwrap();
        for (key, value) in &keys {
            assert_eq!(persistent.try_match(key).unwrap(), Some(*value));
        }
    }

    #[test]
    fn missing_metadata_falls_back_to_default_limit() {
        let fst = Fst::from_sorted_iter([("ab", 1u32)]).unwrap();
        let mut bytes = fst.to_bytes().unwrap();
        // Keep the root, zero the metadata after it.
        for b in &mut bytes[15..HEADER_SIZE] {
            *b = 0;
        }
        let persistent = PersistentFst::<u32, _>::open(MemoryStorage::from_bytes(bytes)).unwrap();
        assert_eq!(persistent.key_length_limit(), crate::config::DEFAULT_MAX_KEY_LENGTH);
        assert_eq!(persistent.try_match("ab").unwrap(), Some(1));
        assert_eq!(persistent.to_fst().unwrap().len(), 1);
    }

    #[test]
    fn unfinished_image_is_rejected() {
        let mut bytes = placeholder_header(Format::Default).to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 0, 0]);
        assert!(matches!(
            PersistentFst::<u32, _>::open(MemoryStorage::from_bytes(bytes)),
            Err(FstError::Corrupt(_))
        ));
    }

    #[test]
    fn truncated_root_record_fails_lookup() {
        let fst = Fst::from_sorted_iter([("a", 1u32)]).unwrap();
        let bytes = fst.to_bytes().unwrap();
        let cut = MemoryStorage::from_bytes(&bytes[..bytes.len() - 3]);
        let persistent = PersistentFst::<u32, _>::open(cut).unwrap();
        assert!(matches!(
            persistent.try_match("a"),
            Err(FstError::TooShort { .. })
        ));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = Fst::from_sorted_iter([("a", 1u32)]).unwrap().to_bytes().unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            PersistentFst::<u32, _>::open(MemoryStorage::from_bytes(bytes)),
            Err(FstError::InvalidMagic)
        ));
    }
}
