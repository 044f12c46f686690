//! Error types for cuantizar
//!
//! Every error is fatal to a quantization run. Variants carry the offending
//! value (tensor name, pattern text, or type string) so the CLI can report it
//! verbatim before exiting with status 1.

use thiserror::Error;

/// Result type alias for cuantizar operations
pub type Result<T> = std::result::Result<T, CuantizarError>;

/// Error type for all cuantizar operations
#[derive(Debug, Error)]
pub enum CuantizarError {
    /// Malformed command line or rule syntax
    #[error("invalid argument '{argument}': {reason}")]
    ArgumentError {
        /// The argument text as supplied
        argument: String,
        /// What is wrong with it
        reason: String,
    },

    /// Type name not present in the catalog
    #[error("unknown quantization type '{name}'")]
    UnknownType {
        /// The type string as supplied
        name: String,
    },

    /// Rule or skip pattern failed to compile
    #[error("invalid regex pattern '{pattern}': {reason}")]
    PatternCompile {
        /// The pattern text as supplied
        pattern: String,
        /// Compiler diagnostic
        reason: String,
    },

    /// Attempt to quantize a tensor whose source data is already quantized
    #[error("tensor '{tensor}': unsupported source type {type_name} for quantization (only f32 and f16 can be quantized)")]
    UnsupportedSourceType {
        /// Tensor name
        tensor: String,
        /// Declared source type name
        type_name: String,
    },

    /// Bad magic, truncated record, or out-of-range header field
    #[error("format error: {reason}")]
    FormatError {
        /// Description of the violation
        reason: String,
    },

    /// Tensor shape incompatible with the target block layout
    #[error("invalid shape: {reason}")]
    InvalidShape {
        /// Description of the mismatch
        reason: String,
    },

    /// Declared tensor size exceeds the buffer sized from the header type
    #[error("buffer too small for tensor '{tensor}': need {required} bytes, allocated {allocated}")]
    BufferTooSmall {
        /// Tensor name
        tensor: String,
        /// Bytes needed for the declared type
        required: usize,
        /// Bytes allocated from the header type
        allocated: usize,
    },

    /// Open/read/write failure
    #[error("I/O error during {operation}: {source}")]
    IoError {
        /// What was being attempted
        operation: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl CuantizarError {
    /// Wrap an I/O error with the operation that produced it
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::IoError {
            operation: operation.into(),
            source,
        }
    }

    /// Create a format error
    pub fn format(reason: impl Into<String>) -> Self {
        Self::FormatError {
            reason: reason.into(),
        }
    }

    /// Create an argument error
    pub fn argument(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ArgumentError {
            argument: argument.into(),
            reason: reason.into(),
        }
    }

    /// Process exit code for this error
    ///
    /// The tool does not distinguish failure classes on exit.
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// Short category label attached to the failure log event
    pub fn category(&self) -> &'static str {
        match self {
            Self::ArgumentError { .. } => "argument",
            Self::UnknownType { .. } => "unknown_type",
            Self::PatternCompile { .. } => "pattern",
            Self::UnsupportedSourceType { .. } => "unsupported_source",
            Self::FormatError { .. } => "format",
            Self::InvalidShape { .. } => "shape",
            Self::BufferTooSmall { .. } => "buffer",
            Self::IoError { .. } => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_type_message_carries_name() {
        let err = CuantizarError::UnknownType {
            name: "q9_bogus".to_string(),
        };
        assert!(err.to_string().contains("q9_bogus"));
        assert_eq!(err.category(), "unknown_type");
    }

    #[test]
    fn test_pattern_compile_message_carries_pattern() {
        let err = CuantizarError::PatternCompile {
            pattern: "enc(".to_string(),
            reason: "unclosed group".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("enc("));
        assert!(msg.contains("unclosed group"));
    }

    #[test]
    fn test_unsupported_source_names_tensor() {
        let err = CuantizarError::UnsupportedSourceType {
            tensor: "encoder.blocks.0.mlp.0.weight".to_string(),
            type_name: "q4_0".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("encoder.blocks.0.mlp.0.weight"));
        assert!(msg.contains("q4_0"));
    }

    #[test]
    fn test_io_error_keeps_source_and_operation() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.bin");
        let err = CuantizarError::io("open input", io);
        assert!(err.to_string().contains("open input"));
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.category(), "io");
    }

    #[test]
    fn test_every_error_exits_with_one() {
        let errors = [
            CuantizarError::argument("--tensor-type", "expected PATTERN=TYPE"),
            CuantizarError::format("bad magic"),
            CuantizarError::InvalidShape {
                reason: "row".to_string(),
            },
        ];
        for err in &errors {
            assert_eq!(err.exit_code(), 1);
        }
    }
}
