//! Wire format for path vectors carried inside broadcasts.
//!
//! ```text
//! path_vector := "" | id ("," id)*
//! id          := [0-9]+            (decimal, fits in u32)
//! ```
//!
//! The empty sequence renders as the empty string. Anything else that does
//! not match the grammar exactly (empty elements, signs, whitespace) is
//! rejected so that `decode(encode(v)) == v` holds and nothing else decodes.

use thiserror::Error;

use crate::types::{NodeId, PathVector};

/// Separator between ids.
pub const SEPARATOR: char = ',';

/// Malformed path-vector payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Two separators in a row, or a leading/trailing separator.
    #[error("empty element at position {0}")]
    EmptyElement(usize),
    /// Element contains something other than ASCII digits.
    #[error("invalid character in element {0:?}")]
    InvalidDigit(String),
    /// Element does not fit in a node id.
    #[error("node id {0:?} out of range")]
    Overflow(String),
}

/// Render a path vector as a comma-separated decimal list.
pub fn encode(path_vector: &[NodeId]) -> String {
    let mut out = String::with_capacity(path_vector.len() * 4);
    for (i, id) in path_vector.iter().enumerate() {
        if i > 0 {
            out.push(SEPARATOR);
        }
        out.push_str(&id.to_string());
    }
    out
}

/// Parse a comma-separated decimal list back into a path vector.
pub fn decode(data: &str) -> Result<PathVector, DecodeError> {
    if data.is_empty() {
        return Ok(PathVector::new());
    }

    data.split(SEPARATOR)
        .enumerate()
        .map(|(pos, element)| decode_id(pos, element))
        .collect()
}

fn decode_id(pos: usize, element: &str) -> Result<NodeId, DecodeError> {
    if element.is_empty() {
        return Err(DecodeError::EmptyElement(pos));
    }
    // `u32::from_str` accepts a leading '+', the grammar does not.
    if !element.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::InvalidDigit(element.to_owned()));
    }
    element
        .parse::<NodeId>()
        .map_err(|_| DecodeError::Overflow(element.to_owned()))
}
