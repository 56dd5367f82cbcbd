//! Operation log record framing.
//!
//! Each record is laid out as:
//!
//! ```text
//! | magic "EBOP" (4) | version u16 | kind u8 | len u32 | payload (len) | crc32 u32 |
//! ```
//!
//! Integers are little-endian. The CRC covers header and payload. Put payloads
//! are CBOR-encoded [`QueuedOperation`]s, delete payloads are the 16 raw bytes
//! of the operation id.

use crate::error::{StoreError, StoreResult};
use crate::operation::{OperationId, QueuedOperation};
use uuid::Uuid;

/// Magic bytes opening every log record.
pub const RECORD_MAGIC: [u8; 4] = *b"EBOP";

/// Current record format version.
pub const RECORD_VERSION: u16 = 1;

/// Header size: magic + version + kind + length.
pub const HEADER_SIZE: usize = 4 + 2 + 1 + 4;

/// Trailing checksum size.
pub const CRC_SIZE: usize = 4;

/// Largest payload a record may carry.
pub const MAX_RECORD_LEN: usize = 16 * 1024 * 1024;

/// Kind of log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// Insert or overwrite an operation.
    Put = 1,
    /// Remove an operation.
    Delete = 2,
}

impl RecordKind {
    /// Converts a byte to a record kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Put),
            2 => Some(Self::Delete),
            _ => None,
        }
    }
}

/// A decoded log record.
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    /// Full snapshot of an operation.
    Put(QueuedOperation),
    /// Removal of an operation.
    Delete(OperationId),
}

impl LogRecord {
    /// Returns the operation id this record concerns.
    pub fn operation_id(&self) -> OperationId {
        match self {
            LogRecord::Put(op) => op.id,
            LogRecord::Delete(id) => *id,
        }
    }

    fn kind(&self) -> RecordKind {
        match self {
            LogRecord::Put(_) => RecordKind::Put,
            LogRecord::Delete(_) => RecordKind::Delete,
        }
    }

    /// Encodes the record with its envelope and checksum.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        let payload = match self {
            LogRecord::Put(op) => {
                let mut buf = Vec::new();
                ciborium::into_writer(op, &mut buf)
                    .map_err(|e| StoreError::Encode(e.to_string()))?;
                buf
            }
            LogRecord::Delete(id) => id.as_uuid().as_bytes().to_vec(),
        };
        if payload.len() > MAX_RECORD_LEN {
            return Err(StoreError::Encode(format!(
                "payload of {} bytes too large",
                payload.len()
            )));
        }
        let len = payload.len() as u32;

        let mut out = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        out.extend_from_slice(&RECORD_MAGIC);
        out.extend_from_slice(&RECORD_VERSION.to_le_bytes());
        out.push(self.kind() as u8);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&payload);
        let crc = compute_crc32(&out);
        out.extend_from_slice(&crc.to_le_bytes());
        Ok(out)
    }

    fn decode_payload(kind: RecordKind, payload: &[u8], offset: u64) -> StoreResult<Self> {
        match kind {
            RecordKind::Put => ciborium::from_reader(payload)
                .map(LogRecord::Put)
                .map_err(|e| StoreError::corrupted(offset, format!("undecodable operation: {e}"))),
            RecordKind::Delete => {
                let bytes: [u8; 16] = payload.try_into().map_err(|_| {
                    StoreError::corrupted(offset, "delete record must hold 16 id bytes")
                })?;
                Ok(LogRecord::Delete(OperationId::from_uuid(Uuid::from_bytes(bytes))))
            }
        }
    }
}

/// Outcome of scanning a log image.
#[derive(Debug, Default)]
pub struct LogScan {
    /// Records in log order with their starting offsets.
    pub records: Vec<(u64, LogRecord)>,
    /// Length of the well-formed prefix of the log.
    pub valid_len: u64,
    /// Bytes after `valid_len` belonging to an interrupted final write.
    pub torn_bytes: u64,
}

/// Scans a complete log image.
///
/// A damaged *final* record is an interrupted append and is reported through
/// [`LogScan::torn_bytes`]. Damage before the final record means the log was
/// corrupted after it was written and fails with [`StoreError::Corrupted`].
/// A record that looks truncated counts as final only if no intact record
/// follows it, so a damaged length field cannot swallow the rest of the log.
pub fn scan(bytes: &[u8]) -> StoreResult<LogScan> {
    let total = bytes.len();
    let mut scan = LogScan::default();
    let mut pos = 0usize;

    while pos < total {
        let offset = pos as u64;
        let remaining = total - pos;
        if remaining < HEADER_SIZE {
            break;
        }

        let header = &bytes[pos..pos + HEADER_SIZE];
        if header[0..4] != RECORD_MAGIC {
            return Err(StoreError::corrupted(offset, "invalid record magic"));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version > RECORD_VERSION {
            return Err(StoreError::corrupted(
                offset,
                format!("unsupported record version {version}"),
            ));
        }
        let kind = RecordKind::from_byte(header[6]).ok_or_else(|| {
            StoreError::corrupted(offset, format!("unknown record kind {}", header[6]))
        })?;
        let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;
        if len > MAX_RECORD_LEN {
            return Err(StoreError::corrupted(
                offset,
                format!("record length {len} exceeds {MAX_RECORD_LEN}"),
            ));
        }

        let end = pos + HEADER_SIZE + len + CRC_SIZE;
        if end > total {
            if let Some(next) = find_intact_record(bytes, pos + 1) {
                return Err(StoreError::corrupted(
                    offset,
                    format!("record length {len} overruns intact record at offset {next}"),
                ));
            }
            break;
        }

        let payload_end = pos + HEADER_SIZE + len;
        let stored_crc = u32::from_le_bytes([
            bytes[payload_end],
            bytes[payload_end + 1],
            bytes[payload_end + 2],
            bytes[payload_end + 3],
        ]);
        let computed_crc = compute_crc32(&bytes[pos..payload_end]);
        if stored_crc != computed_crc {
            if end == total && find_intact_record(bytes, pos + 1).is_none() {
                break;
            }
            return Err(StoreError::corrupted(
                offset,
                format!("checksum mismatch: stored {stored_crc:#010x}, computed {computed_crc:#010x}"),
            ));
        }

        let record = LogRecord::decode_payload(kind, &bytes[pos + HEADER_SIZE..payload_end], offset)?;
        scan.records.push((offset, record));
        pos = end;
    }

    scan.valid_len = pos as u64;
    scan.torn_bytes = (total - pos) as u64;
    Ok(scan)
}

/// Offset of the first well-formed, checksum-valid record starting at or
/// after `from`.
fn find_intact_record(bytes: &[u8], from: usize) -> Option<usize> {
    let total = bytes.len();
    (from..total.saturating_sub(HEADER_SIZE + CRC_SIZE - 1)).find(|&pos| {
        let header = &bytes[pos..pos + HEADER_SIZE];
        if header[0..4] != RECORD_MAGIC || RecordKind::from_byte(header[6]).is_none() {
            return false;
        }
        let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;
        let payload_end = pos + HEADER_SIZE + len;
        if len > MAX_RECORD_LEN || payload_end + CRC_SIZE > total {
            return false;
        }
        let stored = u32::from_le_bytes([
            bytes[payload_end],
            bytes[payload_end + 1],
            bytes[payload_end + 2],
            bytes[payload_end + 3],
        ]);
        stored == compute_crc32(&bytes[pos..payload_end])
    })
}

/// Computes CRC32 checksum for data.
pub fn compute_crc32(data: &[u8]) -> u32 {
    // IEEE polynomial, reflected
    const CRC32_TABLE: [u32; 256] = {
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
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
