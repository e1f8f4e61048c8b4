//! Row record serialization.
//!
//! A row is stored as one record holding every cell of the row in column
//! order. Cell lengths are written explicitly, so cell bytes are never scanned
//! for a terminator.
//!
//! # Record Format
//!
//! ```text
//! +-----------+------------------------------------------------+
//! | 0-1       | cell_count (2 bytes)                           |
//! | per cell  | length (4 bytes, 0xFFFFFFFF = absent) + bytes  |
//! | N-N+3     | CRC32 checksum (4 bytes)                       |
//! +-----------+------------------------------------------------+
//! ```

// cell counts and lengths are bounded before the narrowing casts
#![allow(clippy::cast_possible_truncation)]

/// The cells of one row in column order. `None` is an absent (null) cell.
pub type Cells = Vec<Option<Vec<u8>>>;

/// Length marker for an absent cell.
const ABSENT: u32 = u32::MAX;

const COUNT_SIZE: usize = 2;
const LENGTH_SIZE: usize = 4;
const CHECKSUM_SIZE: usize = 4;

/// Maximum number of cells in a record.
pub const MAX_CELLS: usize = u16::MAX as usize;

/// Maximum size of a single cell. `u32::MAX` is reserved for absent cells.
pub const MAX_CELL_SIZE: usize = (u32::MAX - 1) as usize;

/// Serialize a row.
///
/// # Errors
///
/// Fails if the row has too many cells or a cell is too large to encode.
pub fn encode(cells: &[Option<Vec<u8>>]) -> Result<Vec<u8>, RecordError> {
    if cells.len() > MAX_CELLS {
        return Err(RecordError::TooManyCells(cells.len()));
    }
    let payload: usize = cells
        .iter()
        .map(|c| LENGTH_SIZE + c.as_ref().map_or(0, Vec::len))
        .sum();
    let mut bytes = Vec::with_capacity(COUNT_SIZE + payload + CHECKSUM_SIZE);

    bytes.extend_from_slice(&(cells.len() as u16).to_le_bytes());
    for cell in cells {
        match cell {
            Some(value) => {
                if value.len() > MAX_CELL_SIZE {
                    return Err(RecordError::CellTooLarge(value.len()));
                }
                bytes.extend_from_slice(&(value.len() as u32).to_le_bytes());
                bytes.extend_from_slice(value);
            }
            None => bytes.extend_from_slice(&ABSENT.to_le_bytes()),
        }
    }

    let checksum = crc32fast::hash(&bytes);
    bytes.extend_from_slice(&checksum.to_le_bytes());
    Ok(bytes)
}

/// Deserialize a row produced by `encode`.
///
/// # Errors
///
/// Fails on a checksum mismatch, a truncated record, or trailing bytes.
pub fn decode(bytes: &[u8]) -> Result<Cells, RecordError> {
    if bytes.len() < COUNT_SIZE + CHECKSUM_SIZE {
        return Err(RecordError::Truncated);
    }
    let (body, checksum) = bytes.split_at(bytes.len() - CHECKSUM_SIZE);
    let expected = u32::from_le_bytes([checksum[0], checksum[1], checksum[2], checksum[3]]);
    let actual = crc32fast::hash(body);
    if expected != actual {
        return Err(RecordError::ChecksumMismatch { expected, actual });
    }

    let count = u16::from_le_bytes([body[0], body[1]]) as usize;
    let mut cells = Vec::with_capacity(count);
    let mut offset = COUNT_SIZE;
    for _ in 0..count {
        let length_bytes = body
            .get(offset..offset + LENGTH_SIZE)
            .ok_or(RecordError::Truncated)?;
        let length = u32::from_le_bytes([
            length_bytes[0],
            length_bytes[1],
            length_bytes[2],
            length_bytes[3],
        ]);
        offset += LENGTH_SIZE;
        if length == ABSENT {
            cells.push(None);
            continue;
        }
        let end = offset
            .checked_add(length as usize)
            .ok_or(RecordError::Truncated)?;
        let value = body.get(offset..end).ok_or(RecordError::Truncated)?;
        cells.push(Some(value.to_vec()));
        offset = end;
    }

    if offset != body.len() {
        return Err(RecordError::TrailingBytes(body.len() - offset));
    }
    Ok(cells)
}

/// Errors from row record serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The record ended before all cells were read.
    Truncated,
    /// Stored and computed checksums differ.
    ChecksumMismatch { expected: u32, actual: u32 },
    /// Bytes remain after the last cell.
    TrailingBytes(usize),
    /// The row has more cells than a record can hold.
    TooManyCells(usize),
    /// A cell is larger than a record can hold.
    CellTooLarge(usize),
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated row record"),
            Self::ChecksumMismatch { expected, actual } => write!(
                f,
                "row record checksum mismatch: expected 0x{expected:08x}, got 0x{actual:08x}"
            ),
            Self::TrailingBytes(n) => write!(f, "{n} trailing bytes after row record"),
            Self::TooManyCells(n) => write!(f, "row has {n} cells, maximum is {MAX_CELLS}"),
            Self::CellTooLarge(n) => write!(f, "cell of {n} bytes is too large"),
        }
    }
}

impl std::error::Error for RecordError {}
