// Node record encoding for the default and compressed formats.
//
// Default record:
//   flags:u8 | final_output (fixed, if final) | arc_count:u32 |
//   arc_count * (symbol:u32, output (fixed), target:u64)
//
// Compressed record:
//   flags:u8 | final_output (var, if final) | arc_count (var) |
//   arc_count * (symbol (var), output (var), record_address - target (var))
//
// Integers are little-endian; var-ints are unsigned LEB128.

use crate::FstError;
use crate::format::{Format, HEADER_SIZE};
use crate::output::Output;
use crate::state::{Addr, Arc, State};

const FLAG_FINAL: u8 = 0x01;

/// Longest LEB128 encoding of a u64.
const MAX_VARINT_LEN: usize = 10;

pub fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Read a LEB128 value at `*pos`, advancing `pos` past it.
///
/// Running off the end of `data` yields [`FstError::TooShort`], so callers
/// reading from storage in chunks can fetch more and retry.
pub fn read_varint(data: &[u8], pos: &mut usize) -> Result<u64, FstError> {
    let mut value = 0u64;
    for i in 0..MAX_VARINT_LEN {
        let Some(&byte) = data.get(*pos + i) else {
            return Err(FstError::TooShort {
                expected: (*pos + i + 1) as u64,
                actual: data.len() as u64,
            });
        };
        let bits = u64::from(byte & 0x7F);
        if i == MAX_VARINT_LEN - 1 && bits > 1 {
            break;
        }
        value |= bits << (7 * i);
        if byte & 0x80 == 0 {
            *pos += i + 1;
            return Ok(value);
        }
    }
    Err(FstError::Corrupt(format!("var-int at offset {} overflows u64", *pos)))
}

/// Size of one fixed-width arc in the default format.
#[inline]
pub const fn default_arc_size<O: Output>() -> usize {
    4 + O::FIXED_WIDTH + 8
}

/// Size of the part of a default record preceding its arcs.
#[inline]
pub const fn default_head_size<O: Output>(is_final: bool) -> usize {
    1 + if is_final { O::FIXED_WIDTH } else { 0 } + 4
}

/// Append the record of `state`, which is being written at `addr`.
///
/// Every arc target must already be the address of a written record.
pub fn encode_state<O: Output>(format: Format, state: &State<O>, addr: Addr, buf: &mut Vec<u8>) {
    let flags = if state.is_final { FLAG_FINAL } else { 0 };
    buf.push(flags);
    match format {
        Format::Default => {
            if state.is_final {
                state.final_output.write_fixed(buf);
            }
            buf.extend_from_slice(&(state.arcs.len() as u32).to_le_bytes());
            for arc in &state.arcs {
                buf.extend_from_slice(&u32::from(arc.symbol).to_le_bytes());
                arc.output.write_fixed(buf);
                buf.extend_from_slice(&arc.target.to_le_bytes());
            }
        }
        Format::Compressed => {
            if state.is_final {
                state.final_output.write_var(buf);
            }
            write_varint(buf, state.arcs.len() as u64);
            for arc in &state.arcs {
                debug_assert!(arc.target < addr, "arc target must precede its record");
                write_varint(buf, u64::from(arc.symbol));
                arc.output.write_var(buf);
                write_varint(buf, addr - arc.target);
            }
        }
    }
}

/// Decoded leading part of a default-format record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultHead<O> {
    pub is_final: bool,
    pub final_output: O,
    pub arc_count: u32,
    /// Size of the head in bytes; arcs start right after it.
    pub size: usize,
}

/// Decode the head of a default record from bytes starting at the record.
pub fn decode_default_head<O: Output>(data: &[u8]) -> Result<DefaultHead<O>, FstError> {
    let flags = *data.first().ok_or(FstError::TooShort {
        expected: 1,
        actual: 0,
    })?;
    let is_final = parse_flags(flags)?;
    let size = default_head_size::<O>(is_final);
    ensure_len(data, size)?;

    let final_output = if is_final {
        O::read_fixed(&data[1..1 + O::FIXED_WIDTH])
    } else {
        O::zero()
    };
    let count_at = size - 4;
    let arc_count = u32::from_le_bytes([
        data[count_at],
        data[count_at + 1],
        data[count_at + 2],
        data[count_at + 3],
    ]);
    Ok(DefaultHead {
        is_final,
        final_output,
        arc_count,
        size,
    })
}

/// Symbol of a fixed-width arc; `data` starts at the arc.
pub fn decode_default_symbol(data: &[u8]) -> Result<char, FstError> {
    ensure_len(data, 4)?;
    let raw = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    char::from_u32(raw).ok_or_else(|| FstError::Corrupt(format!("invalid symbol {raw:#x}")))
}

/// Decode a fixed-width arc of the record at `record`; `data` starts at the arc.
pub fn decode_default_arc<O: Output>(data: &[u8], record: Addr) -> Result<Arc<O>, FstError> {
    ensure_len(data, default_arc_size::<O>())?;
    let symbol = decode_default_symbol(data)?;
    let output = O::read_fixed(&data[4..4 + O::FIXED_WIDTH]);
    let t = 4 + O::FIXED_WIDTH;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[t..t + 8]);
    let target = u64::from_le_bytes(raw);
    check_target(target, record)?;
    Ok(Arc {
        symbol,
        output,
        target,
    })
}

/// Decode a whole record located at `addr`; `data` starts at the record.
///
/// Returns the state and the number of bytes it occupies.
pub fn decode_state<O: Output>(
    format: Format,
    data: &[u8],
    addr: Addr,
) -> Result<(State<O>, usize), FstError> {
    let (state, size) = match format {
        Format::Default => decode_default_state(data, addr)?,
        Format::Compressed => decode_compressed_state(data, addr)?,
    };
    for pair in state.arcs.windows(2) {
        if pair[0].symbol >= pair[1].symbol {
            return Err(FstError::Corrupt(format!(
                "arcs of record {addr} are not strictly sorted by symbol"
            )));
        }
    }
    Ok((state, size))
}

fn decode_default_state<O: Output>(
    data: &[u8],
    addr: Addr,
) -> Result<(State<O>, usize), FstError> {
    let head = decode_default_head::<O>(data)?;
    let arc_size = default_arc_size::<O>();
    let size = (head.arc_count as usize)
        .checked_mul(arc_size)
        .and_then(|arcs| arcs.checked_add(head.size))
        .ok_or_else(|| FstError::Corrupt(format!("arc count {} overflows", head.arc_count)))?;
    ensure_len(data, size)?;

    let arcs = (0..head.arc_count as usize)
        .map(|i| decode_default_arc(&data[head.size + i * arc_size..], addr))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((
        State {
            is_final: head.is_final,
            final_output: head.final_output,
            arcs,
        },
        size,
    ))
}

fn decode_compressed_state<O: Output>(
    data: &[u8],
    addr: Addr,
) -> Result<(State<O>, usize), FstError> {
    let flags = *data.first().ok_or(FstError::TooShort {
        expected: 1,
        actual: 0,
    })?;
    let is_final = parse_flags(flags)?;
    let mut pos = 1;
    let final_output = if is_final {
        O::read_var(data, &mut pos)?
    } else {
        O::zero()
    };
    let arc_count = read_varint(data, &mut pos)?;
    // Symbol and delta take a byte each, plus the smallest output.
    let min_arc = 2 + O::MIN_VAR_WIDTH as u64;
    let remaining = data.len().saturating_sub(pos) as u64;
    if arc_count.saturating_mul(min_arc) > remaining {
        return Err(FstError::TooShort {
            expected: (pos as u64).saturating_add(arc_count.saturating_mul(min_arc)),
            actual: data.len() as u64,
        });
    }

    let mut arcs = Vec::with_capacity(arc_count as usize);
    for _ in 0..arc_count {
        let raw = read_varint(data, &mut pos)?;
        let symbol = u32::try_from(raw)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| FstError::Corrupt(format!("invalid symbol {raw:#x}")))?;
        let output = O::read_var(data, &mut pos)?;
        let delta = read_varint(data, &mut pos)?;
        let target = addr.checked_sub(delta).ok_or_else(|| {
            FstError::Corrupt(format!("arc delta {delta} underflows record {addr}"))
        })?;
        check_target(target, addr)?;
        arcs.push(Arc {
            symbol,
            output,
            target,
        });
    }
    Ok((
        State {
            is_final,
            final_output,
            arcs,
        },
        pos,
    ))
}

fn parse_flags(flags: u8) -> Result<bool, FstError> {
    if flags & !FLAG_FINAL != 0 {
        return Err(FstError::Corrupt(format!("unknown record flags {flags:#04x}")));
    }
    Ok(flags & FLAG_FINAL != 0)
}

fn ensure_len(data: &[u8], needed: usize) -> Result<(), FstError> {
    if data.len() < needed {
        return Err(FstError::TooShort {
            expected: needed as u64,
            actual: data.len() as u64,
        });
    }
    Ok(())
}

/// Targets must point backwards and past the header.
fn check_target(target: Addr, record: Addr) -> Result<(), FstError> {
    if target >= record || target < HEADER_SIZE as u64 {
        return Err(FstError::Corrupt(format!(
            "arc of record {record} points to invalid address {target}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> State<u32> {
        State {
            is_final: true,
            final_output: 7,
            arcs: vec![
                Arc {
                    symbol: 'a',
                    output: 300,
                    target: 40,
                },
                Arc {
                    symbol: '\u{00e4}',
                    output: 0,
                    target: 31,
                },
            ],
        }
    }

    #[test]
    fn varint_roundtrip_and_lengths() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 0);
        write_varint(&mut buf, 127);
        write_varint(&mut buf, 128);
        write_varint(&mut buf, u64::MAX);
        assert_eq!(buf.len(), 1 + 1 + 2 + MAX_VARINT_LEN);

        let mut pos = 0;
        assert_eq!(read_varint(&buf, &mut pos).unwrap(), 0);
        assert_eq!(read_varint(&buf, &mut pos).unwrap(), 127);
        assert_eq!(read_varint(&buf, &mut pos).unwrap(), 128);
        assert_eq!(read_varint(&buf, &mut pos).unwrap(), u64::MAX);
        assert_eq!(pos, buf.len());
    }

    #[test]
    fn varint_truncated_and_overflowing() {
        let mut pos = 0;
        assert!(matches!(
            read_varint(&[0x80, 0x80], &mut pos),
            Err(FstError::TooShort { .. })
        ));
        assert_eq!(pos, 0);

        let overflow = [0xFFu8; 11];
        assert!(matches!(
            read_varint(&overflow, &mut pos),
            Err(FstError::Corrupt(_))
        ));
    }

    #[test]
    fn default_record_layout() {
        let mut buf = Vec::new();
        encode_state(Format::Default, &sample_state(), 100, &mut buf);
        assert_eq!(buf.len(), default_head_size::<u32>(true) + 2 * default_arc_size::<u32>());

        let head = decode_default_head::<u32>(&buf).unwrap();
        assert!(head.is_final);
        assert_eq!(head.final_output, 7);
        assert_eq!(head.arc_count, 2);

        let second = &buf[head.size + default_arc_size::<u32>()..];
        assert_eq!(decode_default_symbol(second).unwrap(), '\u{00e4}');
        assert_eq!(decode_default_arc::<u32>(second, 100).unwrap().target, 31);

        let (state, size) = decode_state::<u32>(Format::Default, &buf, 100).unwrap();
        assert_eq!(state, sample_state());
        assert_eq!(size, buf.len());
    }

    #[test]
    fn compressed_record_uses_deltas() {
        let mut buf = Vec::new();
        encode_state(Format::Compressed, &sample_state(), 100, &mut buf);
        // flags, final, count, then ('a', 300 -> 2 bytes, 60), ('ä' -> 2 bytes, 0, 69)
        assert_eq!(buf.len(), 1 + 1 + 1 + (1 + 2 + 1) + (2 + 1 + 1));

        let (state, size) = decode_state::<u32>(Format::Compressed, &buf, 100).unwrap();
        assert_eq!(state, sample_state());
        assert_eq!(size, buf.len());
    }

    #[test]
    fn unit_output_record_decodes_at_end_of_data() {
        let state = State::<()> {
            is_final: false,
            final_output: (),
            arcs: vec![
                Arc {
                    symbol: 'a',
                    output: (),
                    target: 31,
                },
                Arc {
                    symbol: 'b',
                    output: (),
                    target: 31,
                },
            ],
        };
        for format in [Format::Default, Format::Compressed] {
            let mut buf = Vec::new();
            encode_state(format, &state, 40, &mut buf);
            let (decoded, size) = decode_state::<()>(format, &buf, 40).unwrap();
            assert_eq!(decoded, state, "{format:?}");
            assert_eq!(size, buf.len());
            assert!(matches!(
                decode_state::<()>(format, &buf[..buf.len() - 1], 40),
                Err(FstError::TooShort { .. })
            ));
        }
    }

    #[test]
    fn truncated_records_are_too_short() {
        for format in [Format::Default, Format::Compressed] {
            let mut buf = Vec::new();
            encode_state(format, &sample_state(), 100, &mut buf);
            for cut in 0..buf.len() {
                let err = decode_state::<u32>(format, &buf[..cut], 100).unwrap_err();
                assert!(
                    matches!(err, FstError::TooShort { .. }),
                    "{format:?} cut at {cut}: {err}"
                );
            }
        }
    }

    #[test]
    fn forward_targets_are_rejected() {
        let mut buf = Vec::new();
        encode_state(Format::Default, &sample_state(), 100, &mut buf);
        // The record claims to live at 35, before its arc target 40.
        let err = decode_state::<u32>(Format::Default, &buf, 35).unwrap_err();
        assert!(matches!(err, FstError::Corrupt(_)));
    }

    #[test]
    fn unsorted_arcs_are_rejected() {
        let mut state = sample_state();
        state.arcs.swap(0, 1);
        let mut buf = Vec::new();
        encode_state(Format::Compressed, &state, 100, &mut buf);
        let err = decode_state::<u32>(Format::Compressed, &buf, 100).unwrap_err();
        assert!(matches!(err, FstError::Corrupt(_)));
    }

    #[test]
    fn unknown_flags_are_rejected() {
        let mut buf = Vec::new();
        encode_state(Format::Default, &State::<u32>::empty(), 50, &mut buf);
        buf[0] = 0x80;
        assert!(matches!(
            decode_state::<u32>(Format::Default, &buf, 50),
            Err(FstError::Corrupt(_))
        ));
    }

    #[test]
    fn huge_default_arc_count_is_too_short() {
        let mut buf = Vec::new();
        encode_state(Format::Default, &State::<u32>::empty(), 50, &mut buf);
        buf[1..5].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            decode_state::<u32>(Format::Default, &buf, 50),
            Err(FstError::TooShort { .. })
        ));
    }
}
