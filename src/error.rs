//! Error types for framehouse.

use thiserror::Error;

/// The main error type for framehouse operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An array literal could not be closed or parsed.
    #[error("Malformed literal at position {position}: '{fragment}'")]
    MalformedLiteral { position: usize, fragment: String },

    /// The native literal routine reported a non-zero status.
    #[error("Native decode failed with status {status} for input {:?}", String::from_utf8_lossy(.input))]
    NativeDecode { status: i32, input: Vec<u8> },

    /// The serialized object stream could not be read back.
    #[error("Pickle stream error at offset {offset}: {message}")]
    Pickle { offset: usize, message: String },

    /// A table was built from rows or columns of mismatched length.
    #[error("Table shape error: {0}")]
    Shape(String),

    /// A field could not be converted to the type its column declares.
    #[error("Cannot convert '{field}' in column '{column}' ({type_name}): {source}")]
    Conversion {
        column: String,
        type_name: String,
        field: String,
        #[source]
        source: Box<Error>,
    },

    /// Invalid value for a column type.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// The server answered with a non-success status.
    #[error("Transport error (HTTP {status}): {body}")]
    Transport { status: u16, body: String },

    /// The request never reached the server.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a malformed-literal error for the fragment found at `position`.
    pub fn malformed(position: usize, fragment: impl Into<String>) -> Self {
        Self::MalformedLiteral {
            position,
            fragment: fragment.into(),
        }
    }

    /// Create a pickle stream error at the given offset.
    pub fn pickle(offset: usize, message: impl Into<String>) -> Self {
        Self::Pickle {
            offset,
            message: message.into(),
        }
    }

    /// Wrap a field-level failure with the column it occurred in.
    pub fn conversion(
        column: impl Into<String>,
        type_name: impl Into<String>,
        field: impl Into<String>,
        source: Error,
    ) -> Self {
        Self::Conversion {
            column: column.into(),
            type_name: type_name.into(),
            field: field.into(),
            source: Box::new(source),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::Transport {
                status: status.as_u16(),
                body: e.to_string(),
            },
            None => Self::Connection(e.to_string()),
        }
    }
}

/// Result type alias for framehouse operations.
pub type Result<T> = std::result::Result<T, Error>;
