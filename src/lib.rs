//! # Cuantizar
//!
//! Per-tensor mixed-precision quantization for legacy GGML Whisper model files.
//!
//! Cuantizar (Spanish: "to quantize") streams a `.bin` model from disk to disk,
//! re-encoding each weight matrix to the type chosen for it. Types come from
//! an ordered list of full-name regular-expression rules, falling back to a
//! single run-wide default. Everything else (hyperparameters, mel filters,
//! vocabulary, biases, skipped tensors) is copied through unchanged.
//!
//! ## Example
//!
//! ```rust
//! use cuantizar::{GgmlType, PatternRuleSet, SkipSpec, TensorStreamTranscoder, TypeCatalog};
//!
//! let catalog = TypeCatalog::new();
//! let rules = PatternRuleSet::parse_all(&[r"encoder\..*=q8_0"], &catalog).unwrap();
//! let skip = SkipSpec::whisper().unwrap();
//! let transcoder = TensorStreamTranscoder::new(&catalog, &rules, &skip, GgmlType::Q4_0);
//!
//! // Any rule makes the header fall back to f16
//! assert_eq!(transcoder.header_type(), GgmlType::F16);
//! ```
//!
//! ## Modules
//!
//! - [`catalog`]: GGML type ids, block geometry and name resolution
//! - [`rules`]: ordered `PATTERN=TYPE` rules and the skip list
//! - [`quantize`]: block encoders and decoders
//! - [`format`]: file framing (header, passthrough sections, tensor records)
//! - [`policy`]: byte sizes and the header fallback type
//! - [`transcode`]: the streaming pipeline
//! - [`report`]: per-tensor decisions and run totals
//! - [`config`]: validated run configuration
//! - [`cli`]: the `cuantizar` command-line surface

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_wrap)] // extents are validated against i32 before writing
#![allow(clippy::cast_precision_loss)] // byte counts -> f64 for MB display
#![allow(clippy::cast_possible_truncation)] // quantized levels are clamped before narrowing
#![allow(clippy::cast_sign_loss)] // clamped levels are non-negative
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::float_cmp)] // Allow float comparisons in tests
#![allow(clippy::cast_lossless)]
#![allow(clippy::many_single_char_names)] // d, m, q, x follow the block layouts

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod policy;
pub mod quantize;
pub mod report;
pub mod rules;
pub mod transcode;

// Re-exports for convenience
pub use catalog::{FileType, GgmlType, TypeCatalog, TypeDescriptor};
pub use config::QuantizeConfig;
pub use error::{CuantizarError, Result};
pub use policy::BufferSizePolicy;
pub use report::{TensorDecision, TranscodeReport};
pub use rules::{PatternRuleSet, QuantizationRule, SkipSpec};
pub use transcode::{quantize_model, TensorStreamTranscoder};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
