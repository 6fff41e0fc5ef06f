//! Ring-buffer arithmetic and dive extraction (§4.4, §9).
//!
//! The two pure helpers below are used pervasively by every family's
//! extractor; §9 calls out their round-trip properties explicitly, so
//! they're exercised as property-style unit tests further down.

use crate::error::{Result, Status};

/// `ringbuffer_decrement`: step `n` bytes backwards from `cur`, wrapping at
/// `begin`.
pub fn decrement(cur: usize, n: usize, begin: usize, end: usize) -> usize {
    let span = end - begin;
    let offset = (cur - begin) % span;
    let back = n % span;
    let wrapped = (offset + span - back) % span;
    begin + wrapped
}

/// `ringbuffer_increment`: step `n` bytes forwards from `cur`, wrapping at
/// `end`. Not part of the original's public surface but needed to state
/// `decrement`'s round-trip property cleanly.
pub fn increment(cur: usize, n: usize, begin: usize, end: usize) -> usize {
    let span = end - begin;
    let offset = (cur - begin) % span;
    begin + (offset + n % span) % span
}

/// `ringbuffer_distance`: forward distance from `a` to `b`.
pub fn distance(a: usize, b: usize, begin: usize, end: usize) -> usize {
    let span = end - begin;
    let oa = a - begin;
    let ob = b - begin;
    (ob + span - oa) % span
}

const EOP_MARKER: u8 = 0x82;
const EOD_MARKER: u8 = 0x80;

/// Forward-scanned ring-buffer extraction with an EOP marker (Suunto
/// Eon/Vyper family), grounded on `original_source/src/suunto_common.c`'s
/// `suunto_common_extract_dives`.
///
/// `callback` returns `false` to stop enumeration early (user abort, not
/// an error). Returns the list of extracted dive slices, newest first.
pub fn suunto_extract_dives(
    data: &[u8],
    begin: usize,
    end: usize,
    eop: usize,
    peek: usize,
    mut callback: impl FnMut(&[u8]) -> bool,
) -> Result<()> {
    if !(eop >= begin && eop < end) {
        return Err(Status::invalid_args("eop outside ring bounds"));
    }
    if data.get(eop) != Some(&EOP_MARKER) {
        return Err(Status::protocol("eop byte is not the EOP marker"));
    }

    let span = end - begin;
    let mut buffer = vec![0u8; span];
    let mut current = eop;
    let mut previous = eop;

    for _ in 0..span {
        current = if current == begin { end - 1 } else { current - 1 };

        if data[current] == EOP_MARKER {
            break;
        }

        let index = decrement(current, peek, begin, end);
        if data[index] == EOD_MARKER {
            let len = distance(current, previous, begin, end);
            if current + len > end {
                let a = end - current;
                let b = (current + len) - end;
                buffer[..a].copy_from_slice(&data[current..end]);
                buffer[a..a + b].copy_from_slice(&data[begin..begin + b]);
            } else {
                buffer[..len].copy_from_slice(&data[current..current + len]);
            }

            if !callback(&buffer[..len]) {
                return Ok(());
            }

            previous = current;
        }
    }

    Ok(())
}

/// Header/footer marker extraction for the Reefnet Sensus "classic"
/// family (§4.4, §4.8): scan backwards for a 7-byte `0xFF …… 0xFE` start
/// marker, then forward counting consecutive shallow samples until 17 in a
/// row mark end-of-dive. A temperature byte is interleaved every 6 depth
/// samples.
///
/// `fingerprint_cutoff` is the stored fingerprint timestamp (4-byte LE at
/// `marker + 2`); enumeration halts once a dive's timestamp is `<=` it.
pub fn sensus_extract_dives(
    data: &[u8],
    fingerprint_cutoff: u32,
    mut callback: impl FnMut(&[u8], u32) -> bool,
) -> Result<()> {
    let size = data.len();
    let mut previous = size;
    let mut current = if size >= 7 { size - 7 } else { 0 };

    while current > 0 {
        current -= 1;
        if data[current] == 0xFF && data[current + 6] == 0xFE {
            let mut nsamples = 0usize;
            let mut count = 0usize;
            let mut offset = current + 7;
            let mut found = false;

            while offset + 1 <= previous {
                let depth = data[offset];
                offset += 1;

                if nsamples % 6 == 0 {
                    if offset + 1 > previous {
                        break;
                    }
                    offset += 1;
                }

                nsamples += 1;

                if depth < 13 + 3 {
                    count += 1;
                    if count == 17 {
                        found = true;
                        break;
                    }
                } else {
                    count = 0;
                }
            }

            if !found {
                return Err(Status::protocol("no end of dive found"));
            }

            let timestamp = crate::util::endian::u32_le(data, current + 2);
            if timestamp <= fingerprint_cutoff {
                return Ok(());
            }

            if !callback(&data[current..offset], timestamp) {
                return Ok(());
            }

            previous = current;
            current = if current >= 7 { current - 7 } else { 0 };
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrement_increment_roundtrip() {
        for cur in 10..20usize {
            for n in 0..15usize {
                assert_eq!(increment(decrement(cur, n, 10, 20), n, 10, 20), cur);
            }
        }
    }

    #[test]
    fn distance_matches_increment() {
        for a in 10..20usize {
            for n in 0..15usize {
                let b = increment(a, n, 10, 20);
                assert_eq!(distance(a, b, 10, 20), n % 10);
            }
        }
    }

    /// Builds a start marker (`0xFF spacer ts[4] 0xFE`, 7 bytes total —
    /// the timestamp sits at `marker + 2`, matching
    /// `reefnet_sensus_parser.c`'s `data[current + 6] == 0xFE` check)
    /// followed by a run of `nshallow` shallow depth samples, interleaving
    /// a filler temperature byte every 6th sample per §4.4's "one
    /// temperature byte per 6 depth samples" rule — exactly enough shallow
    /// samples for the 17-in-a-row end-of-dive rule to fire at the last one.
    fn build_sensus_dive(current: usize, timestamp: u32) -> Vec<u8> {
        let mut out = vec![0xFFu8, 0x00];
        out.extend_from_slice(&timestamp.to_le_bytes());
        out.push(0xFE);
        for i in 0..17u32 {
            out.push(0x05); // shallow depth (< 13 + 3)
            if i % 6 == 0 {
                out.push(0x50); // interleaved temperature filler
            }
        }
        let mut data = vec![0u8; current];
        data.extend_from_slice(&out);
        data
    }

    #[test]
    fn end_of_dive_scan_stops_after_seventeen_shallow_samples() {
        let data = build_sensus_dive(10, 0x1234_5678);

        let mut dives = Vec::new();
        sensus_extract_dives(&data, 0, |slice, ts| {
            dives.push((slice.to_vec(), ts));
            true
        })
        .unwrap();

        assert_eq!(dives.len(), 1);
        let (slice, ts) = &dives[0];
        assert_eq!(ts, &0x1234_5678);
        // marker(7) + 17 depth bytes + 3 interleaved temperature bytes.
        assert_eq!(slice.len(), 27);
    }

    #[test]
    fn fingerprint_cutoff_halts_enumeration() {
        let data = build_sensus_dive(10, 100);
        let mut dives = Vec::new();
        sensus_extract_dives(&data, 100, |slice, ts| {
            dives.push((slice.to_vec(), ts));
            true
        })
        .unwrap();
        assert!(dives.is_empty(), "timestamp <= cutoff must halt enumeration");
    }

    #[test]
    fn suunto_extract_requires_eop_marker() {
        let mut data = vec![0u8; 16];
        data[5] = 0x82;
        let err = suunto_extract_dives(&data, 0, 16, 4, 1, |_| true).unwrap_err();
        assert!(matches!(err, Status::Protocol(_)));
    }

    /// S6: three dives at increasing timestamps; installing the middle
    /// one's timestamp as the fingerprint cutoff must stop enumeration
    /// right after the newest dive.
    #[test]
    fn fingerprint_cutoff_stops_after_newest_of_three_dives() {
        let mut data = build_sensus_dive(0, 10); // t1, oldest
        data.extend(build_sensus_dive(0, 20)); // t2
        data.extend(build_sensus_dive(0, 30)); // t3, newest

        let mut seen = Vec::new();
        sensus_extract_dives(&data, 20, |_, ts| {
            seen.push(ts);
            true
        })
        .unwrap();

        assert_eq!(seen, vec![30]);
    }

    /// S7: the newest dive straddles the ring boundary — 40 bytes at
    /// `end-40..end`, continuing with 20 bytes at `begin..begin+20`.
    /// Expected: a single 60-byte blob equal to that wrap-then-head
    /// concatenation.
    #[test]
    fn suunto_extract_handles_wraparound_dive() {
        const BEGIN: usize = 0;
        const END: usize = 100;
        const EOP: usize = 20;
        const PEEK: usize = 1;

        let mut data = vec![0u8; END];
        data[EOP] = 0x82; // eop marker: the ring's write pointer
        data[59] = 0x80; // EOD marker, `peek` bytes behind current=60
        data[60] = 0x01; // dive's first byte, must not equal the EOP marker
        for b in data[61..END].iter_mut() {
            *b = 0xAB;
        }
        for b in data[BEGIN + 1..EOP].iter_mut() {
            *b = 0xCD;
        }

        let mut dives = Vec::new();
        suunto_extract_dives(&data, BEGIN, END, EOP, PEEK, |slice| {
            dives.push(slice.to_vec());
            true
        })
        .unwrap();

        assert_eq!(dives.len(), 1);
        let expected: Vec<u8> = data[60..END]
            .iter()
            .chain(data[BEGIN..EOP].iter())
            .copied()
            .collect();
        assert_eq!(dives[0], expected);
        assert_eq!(dives[0].len(), 60);
    }
}
