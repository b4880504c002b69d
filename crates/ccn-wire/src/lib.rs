//! Wire encoding for a CCN endpoint: token-level primitives, the
//! incremental skeleton decoder used for message framing, name construction
//! and validation, and structural parsers for Interest and ContentObject
//! messages.
//!
//! Parsing here is structural only: it segments elements and records byte
//! offsets, it does not interpret selector contents. Signature verification
//! and selector matching live above this crate.

pub mod coding;
mod content;
mod error;
mod interest;
mod name;
mod scan;
mod skeleton;

pub use content::{ParsedContentObject, encode_content_object, parse_content_object};
pub use error::WireError;
pub use interest::{ParsedInterest, encode_interest, parse_interest};
pub use name::{NameBuilder, is_valid_name, name_from_uri};
pub use skeleton::{SkeletonDecoder, is_complete_message};
