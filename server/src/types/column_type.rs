//! String-like column types.
//!
//! Provides the `ColumnType` enum, the declared-name table that DDL type tokens
//! resolve through, and the per-type validation and encoding rules.
//!
//! # Invariants
//!
//! - `varchar` is an alias: it resolves to `ColumnType::Text` while the
//!   statement is parsed, and no later stage can tell the two apart.
//! - Encoding is the identity on raw bytes. Lengths travel beside the bytes,
//!   never as a terminator, so `0x00` is legal at any position.

use std::fmt;

use crate::types::StringValue;

/// Declared type names, matched case-insensitively.
///
/// Several names may resolve to one variant; the canonical name of each
/// variant comes from `ColumnType::canonical_name`.
const DECLARED_TYPES: &[(&str, ColumnType)] = &[
    ("ascii", ColumnType::Ascii),
    ("blob", ColumnType::Blob),
    ("text", ColumnType::Text),
    ("varchar", ColumnType::Text),
];

/// Column type discriminants.
///
/// The discriminant values are persisted in commit log schema records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ColumnType {
    Ascii = 0x01,
    Blob = 0x02,
    Text = 0x03,
}

impl TryFrom<u8> for ColumnType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Ascii),
            0x02 => Ok(Self::Blob),
            0x03 => Ok(Self::Text),
            _ => Err(value),
        }
    }
}

impl ColumnType {
    /// Resolve a DDL type token to a column type.
    ///
    /// `text` and `varchar` both resolve to `Text`. Matching ignores ASCII
    /// case; no other normalization (such as trimming) is applied.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTypeError` for any token not in the declared-name table.
    pub fn resolve_declared_type(name: &str) -> Result<Self, UnknownTypeError> {
        DECLARED_TYPES
            .iter()
            .find(|(declared, _)| declared.eq_ignore_ascii_case(name))
            .map(|(_, column_type)| *column_type)
            .ok_or_else(|| UnknownTypeError {
                name: name.to_owned(),
            })
    }

    /// The catalog-visible name of this type.
    ///
    /// `Text` always reports `"text"`, whichever alias declared the column.
    #[must_use]
    pub const fn canonical_name(self) -> &'static str {
        match self {
            Self::Ascii => "ascii",
            Self::Blob => "blob",
            Self::Text => "text",
        }
    }

    /// Check a value against this type's constraints.
    ///
    /// Only `Ascii` constrains its bytes (all must be `<= 0x7F`). `Text` is not
    /// checked for UTF-8 well-formedness here.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` naming the first offending byte.
    pub fn validate(self, value: &StringValue) -> Result<(), ValidationError> {
        match self {
            Self::Ascii => match value.as_bytes().iter().position(|b| !b.is_ascii()) {
                Some(offset) => Err(ValidationError {
                    column_type: self,
                    offset,
                    byte: value.as_bytes()[offset],
                }),
                None => Ok(()),
            },
            Self::Blob | Self::Text => Ok(()),
        }
    }

    /// Encode a value for transport or storage.
    ///
    /// This is the identity on the raw bytes for every string type.
    #[must_use]
    pub fn encode(self, value: &StringValue) -> Vec<u8> {
        value.as_bytes().to_vec()
    }

    /// Decode bytes produced by `encode`.
    ///
    /// The result has exactly `bytes.len()` bytes; zero bytes are preserved.
    #[must_use]
    pub fn decode(self, bytes: &[u8]) -> StringValue {
        StringValue::from(bytes)
    }

    /// Whether a value of type `other` can be stored in a column of this type
    /// without conversion.
    ///
    /// Every ascii value is valid text, and any value can be read as a blob.
    #[must_use]
    pub fn is_value_compatible_with(self, other: Self) -> bool {
        self == other || self == Self::Blob || (self == Self::Text && other == Self::Ascii)
    }

    /// Render a value the way it would be written as a CQL literal.
    #[must_use]
    pub fn to_cql_literal(self, value: &StringValue) -> String {
        match self {
            Self::Blob => value.to_hex(),
            Self::Ascii | Self::Text => {
                format!("'{}'", value.to_string_lossy().replace('\'', "''"))
            }
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// A DDL statement referenced a type name that is not a known string type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTypeError {
    /// The type token as it appeared in the statement.
    pub name: String,
}

impl fmt::Display for UnknownTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown type {}", self.name)
    }
}

impl std::error::Error for UnknownTypeError {}

/// A value violated the constraints of its column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The type whose constraint failed.
    pub column_type: ColumnType,
    /// Offset of the first offending byte.
    pub offset: usize,
    /// The offending byte.
    pub byte: u8,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Validation failed - non-ASCII character in an {} string (byte 0x{:02x} at offset {})",
            self.column_type, self.byte, self.offset
        )
    }
}

impl std::error::Error for ValidationError {}
