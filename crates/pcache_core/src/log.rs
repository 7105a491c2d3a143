//! Record log framing.
//!
//! The record log is an append-only sequence of frames:
//!
//! ```text
//! | magic "PCLG" (4) | kind (1) | len u32 LE (4) | CBOR payload (len) | crc32 LE (4) |
//! ```
//!
//! The checksum covers magic, kind, length and payload. Replay stops at the
//! first frame that is truncated or fails its checksum; everything before it
//! is the durable state of the partition.

use crate::error::{CacheError, CacheResult};
use crate::record::LocalRecord;

/// Magic bytes opening every frame.
pub const LOG_MAGIC: [u8; 4] = *b"PCLG";

/// Bytes before the payload: magic, kind, length.
pub const HEADER_LEN: usize = 9;

/// Bytes after the payload: checksum.
pub const TRAILER_LEN: usize = 4;

/// Kind of a log frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// A batch of records to upsert.
    UpsertBatch = 1,
}

impl FrameKind {
    /// Converts a byte to a frame kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::UpsertBatch),
            _ => None,
        }
    }
}

/// Encodes `records` as a single upsert frame.
///
/// # Errors
///
/// Returns a codec error if CBOR encoding fails or the payload does not
/// fit the 4-byte length field.
pub fn encode_batch(records: &[LocalRecord]) -> CacheResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(records, &mut payload)
        .map_err(|e| CacheError::Codec(format!("failed to encode batch: {e}")))?;

    let len = u32::try_from(payload.len())
        .map_err(|_| CacheError::Codec(format!("batch too large: {} bytes", payload.len())))?;

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() + TRAILER_LEN);
    frame.extend_from_slice(&LOG_MAGIC);
    frame.push(FrameKind::UpsertBatch as u8);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    let crc = compute_crc32(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Outcome of replaying a record log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplaySummary {
    /// Number of intact frames.
    pub frames: usize,
    /// Number of records across intact frames.
    pub records: usize,
    /// Length of the intact prefix of the log.
    pub valid_len: u64,
    /// Whether bytes after `valid_len` were discarded.
    pub torn_tail: bool,
}

/// Replays `bytes`, handing each intact batch to `apply` in log order.
///
/// # Errors
///
/// A frame whose checksum matches but whose kind or payload cannot be
/// decoded is reported as [`CacheError::Corrupted`]: that is not a torn
/// write and must not be silently dropped.
pub fn replay<F>(bytes: &[u8], mut apply: F) -> CacheResult<ReplaySummary>
where
    F: FnMut(Vec<LocalRecord>),
{
    let mut summary = ReplaySummary::default();
    let mut offset = 0usize;

    while offset < bytes.len() {
        let rest = &bytes[offset..];
        if rest.len() < HEADER_LEN + TRAILER_LEN || rest[..4] != LOG_MAGIC {
            break;
        }

        let len = u32::from_le_bytes([rest[5], rest[6], rest[7], rest[8]]) as usize;
        let Some(frame_len) = len
            .checked_add(HEADER_LEN + TRAILER_LEN)
            .filter(|&n| n <= rest.len())
        else {
            break;
        };

        let body = &rest[..HEADER_LEN + len];
        let stored = &rest[HEADER_LEN + len..frame_len];
        let stored_crc = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
        if compute_crc32(body) != stored_crc {
            break;
        }

        match FrameKind::from_byte(rest[4]) {
            Some(FrameKind::UpsertBatch) => {
                let records: Vec<LocalRecord> = ciborium::from_reader(&body[HEADER_LEN..])
                    .map_err(|e| {
                        CacheError::corrupted(format!("undecodable batch at offset {offset}: {e}"))
                    })?;
                summary.records += records.len();
                apply(records);
            }
            None => {
                return Err(CacheError::corrupted(format!(
                    "unknown frame kind {} at offset {offset}",
                    rest[4]
                )));
            }
        }

        summary.frames += 1;
        offset += frame_len;
    }

    summary.valid_len = offset as u64;
    summary.torn_tail = offset < bytes.len();
    Ok(summary)
}

/// Computes the CRC32 (IEEE) checksum of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(ids: &[&str]) -> Vec<LocalRecord> {
        ids.iter().map(|id| LocalRecord::new(*id)).collect()
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn replay_applies_frames_in_order() {
        let mut log = encode_batch(&batch(&["a", "b"])).unwrap();
        log.extend(encode_batch(&batch(&["c"])).unwrap());

        let mut seen = Vec::new();
        let summary = replay(&log, |records| {
            seen.extend(records.into_iter().map(|r| r.id));
        })
        .unwrap();

        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.records, 3);
        assert_eq!(summary.valid_len, log.len() as u64);
        assert!(!summary.torn_tail);
    }

    #[test]
    fn torn_tail_is_dropped() {
        let first = encode_batch(&batch(&["a"])).unwrap();
        let second = encode_batch(&batch(&["b"])).unwrap();
        let mut log = first.clone();
        log.extend_from_slice(&second[..second.len() - 3]);

        let mut count = 0;
        let summary = replay(&log, |records| count += records.len()).unwrap();
        assert_eq!(count, 1);
        assert_eq!(summary.valid_len, first.len() as u64);
        assert!(summary.torn_tail);
    }

    #[test]
    fn checksum_mismatch_stops_replay() {
        let mut log = encode_batch(&batch(&["a"])).unwrap();
        let flip = HEADER_LEN + 1;
        log[flip] ^= 0xFF;

        let summary = replay(&log, |_| panic!("corrupted frame applied")).unwrap();
        assert_eq!(summary.frames, 0);
        assert!(summary.torn_tail);
    }

    #[test]
    fn unknown_kind_with_valid_checksum_is_corruption() {
        let mut frame = encode_batch(&batch(&["a"])).unwrap();
        frame[4] = 9;
        let body_len = frame.len() - TRAILER_LEN;
        let crc = compute_crc32(&frame[..body_len]);
        frame[body_len..].copy_from_slice(&crc.to_le_bytes());

        assert!(matches!(
            replay(&frame, |_| {}),
            Err(CacheError::Corrupted { .. })
        ));
    }

    #[test]
    fn garbage_length_is_a_torn_tail() {
        let first = encode_batch(&batch(&["a"])).unwrap();
        let mut log = first.clone();
        log.extend_from_slice(&LOG_MAGIC);
        log.push(FrameKind::UpsertBatch as u8);
        log.extend_from_slice(&u32::MAX.to_le_bytes());
        log.extend_from_slice(&[0; TRAILER_LEN]);

        let summary = replay(&log, |_| {}).unwrap();
        assert_eq!(summary.frames, 1);
        assert_eq!(summary.valid_len, first.len() as u64);
        assert!(summary.torn_tail);
    }

    #[test]
    fn empty_log() {
        let summary = replay(&[], |_| {}).unwrap();
        assert_eq!(summary, ReplaySummary::default());
    }
}
