//! Wire-format boundary.
//!
//! Portable trees are plain JSON-shaped maps; how they travel is the host
//! application's business. Implementations live outside this crate.

use crate::{error::FormatError, tree::Map};

///
/// Formatter
///
/// Encodes a portable tree to a wire string and back. `decode(encode(t))`
/// must reproduce `t` exactly, including field order.
///

pub trait Formatter {
    fn encode(&self, tree: &Map) -> Result<String, FormatError>;

    fn decode(&self, payload: &str) -> Result<Map, FormatError>;
}
