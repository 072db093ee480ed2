//! # framehouse
//!
//! Move tables between Rust and the ClickHouse HTTP interface.
//!
//! ## Quick Example
//!
//! ```rust
//! use framehouse::prelude::*;
//!
//! // Escape a value for embedding in a query
//! assert_eq!(escape_str("it's", Quote::Single), "'it\\'s'");
//!
//! // Decode an array column value
//! let value = framehouse::decode_array("['a','b\\'c']").unwrap();
//! assert_eq!(value, Value::from(vec!["a", "b'c"]));
//! ```
//!
//! ## Decoding strategies
//!
//! | Strategy  | How                                              | Error              |
//! |-----------|--------------------------------------------------|--------------------|
//! | `Textual` | Structural parse, escapes resolved per string    | `MalformedLiteral` |
//! | `Native`  | FFI routine re-encodes to pickle, read back here | `NativeDecode`     |

pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod escape;
pub mod literal;
pub mod native;
pub mod pickle;
pub mod table;
pub mod transport;
pub mod unescape;
pub mod value;

pub use escape::escape;
pub use unescape::decode_escapes;

pub mod prelude {
    pub use crate::client::Connection;
    pub use crate::config::{ConnectionConfig, ConnectionConfigBuilder};
    pub use crate::decoder::{ArrayLiteralDecoder, Strategy};
    pub use crate::error::*;
    pub use crate::escape::{escape, escape_bytes, escape_str, quote_identifier, Escaped, Quote, Scalar};
    pub use crate::native::NativeDecoder;
    pub use crate::table::{Column, Table};
    pub use crate::transport::{HttpTransport, Transport};
    pub use crate::unescape::decode_escapes;
    pub use crate::value::Value;
}

/// Decode an array literal with the default (textual) strategy.
///
/// # Example
///
/// ```
/// use framehouse::{decode_array, value::Value};
///
/// let v = decode_array("[[1,2],[3]]").unwrap();
/// assert_eq!(v, Value::Array(vec![
///     Value::Array(vec![Value::Int(1), Value::Int(2)]),
///     Value::Array(vec![Value::Int(3)]),
/// ]));
/// ```
pub fn decode_array(literal: &str) -> error::Result<value::Value> {
    decoder::ArrayLiteralDecoder::default().decode_array(literal)
}
