//! Array literal decoding with a selectable strategy.

use serde::Deserialize;

use crate::error::Result;
use crate::literal;
use crate::native::NativeDecoder;
use crate::value::Value;

/// How array literals are turned into values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Parse the literal directly, resolving escapes per string element.
    #[default]
    Textual,
    /// Hand the literal to the native routine and read back its pickle stream.
    Native,
}

/// Decodes the textual rendering of an array column value.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayLiteralDecoder {
    strategy: Strategy,
    native: NativeDecoder,
}

impl ArrayLiteralDecoder {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            native: NativeDecoder::new(),
        }
    }

    /// Use a specific native decoder for [`Strategy::Native`].
    pub fn with_native(mut self, native: NativeDecoder) -> Self {
        self.native = native;
        self
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Decode one literal, e.g. `[1,2,3]` or `['a','b\'c']`.
    pub fn decode_array(&self, literal: &str) -> Result<Value> {
        let decoded = match self.strategy {
            Strategy::Textual => literal::parse_array(literal),
            Strategy::Native => self.native.decode(literal),
        };
        if let Err(e) = &decoded {
            tracing::warn!("Failed to decode array literal {:?}: {}", literal, e);
        }
        decoded
    }
}
