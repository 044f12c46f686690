//! Legacy GGML Whisper model file framing
//!
//! ## Layout (little-endian)
//!
//! ```text
//! FILE    := MAGIC HPARAMS MEL VOCAB RECORD*
//! MAGIC   := u32 = 0x67676d6c ("ggml")
//! HPARAMS := i32 x 11 (n_vocab, n_audio_ctx, n_audio_state, n_audio_head,
//!            n_audio_layer, n_text_ctx, n_text_state, n_text_head,
//!            n_text_layer, n_mels, ftype)
//! MEL     := n_mel: i32, n_fft: i32, f32[n_mel * n_fft]
//! VOCAB   := count: i32, (len: u32, bytes[len]) x count
//! RECORD  := rank: i32, name_len: i32, type: i32, extents: i32[rank],
//!            name: bytes[name_len], payload
//! ```
//!
//! Records continue until end of file. A clean EOF exactly at a record
//! boundary ends the stream; EOF anywhere else is a truncated file.
//!
//! The `ftype` field stores `QNT_VERSION * QNT_VERSION_FACTOR + file_type`.

use std::io::{Read, Write};

use serde::Serialize;
use tracing::debug;

use crate::catalog::GgmlType;
use crate::error::{CuantizarError, Result};
use crate::policy::BufferSizePolicy;

mod io;

use io::{copy_exact, read_bytes, read_i32, read_i32_or_eof, read_u32, write_bytes, write_i32, write_u32};

/// File magic: "ggml" in little-endian
pub const GGML_FILE_MAGIC: u32 = 0x6767_6d6c;

/// Quantization format version written into `ftype`
pub const QNT_VERSION: i32 = 2;

/// Multiplier separating the version from the file type in `ftype`
pub const QNT_VERSION_FACTOR: i32 = 1000;

/// Largest tensor rank a record may declare
pub const MAX_TENSOR_RANK: usize = 4;

/// Longest tensor name a record may declare, in bytes
pub const MAX_TENSOR_NAME_LEN: usize = 4096;

// ============================================================================
// Header
// ============================================================================

/// Read and check the file magic
///
/// # Errors
///
/// `FormatError` on mismatch or a file shorter than four bytes.
pub fn read_magic<R: Read>(reader: &mut R) -> Result<()> {
    let magic = read_u32(reader, "magic")?;
    if magic != GGML_FILE_MAGIC {
        return Err(CuantizarError::format(format!(
            "invalid magic 0x{magic:08x}, expected 0x{GGML_FILE_MAGIC:08x} (ggml)"
        )));
    }
    Ok(())
}

/// Write the file magic
///
/// # Errors
///
/// `IoError` from the writer.
pub fn write_magic<W: Write>(writer: &mut W) -> Result<()> {
    write_u32(writer, GGML_FILE_MAGIC, "magic")
}

/// Whisper hyperparameters, in file order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WhisperHparams {
    /// Vocabulary size
    pub n_vocab: i32,
    /// Audio context length
    pub n_audio_ctx: i32,
    /// Audio embedding width
    pub n_audio_state: i32,
    /// Audio attention heads
    pub n_audio_head: i32,
    /// Audio encoder layers
    pub n_audio_layer: i32,
    /// Text context length
    pub n_text_ctx: i32,
    /// Text embedding width
    pub n_text_state: i32,
    /// Text attention heads
    pub n_text_head: i32,
    /// Text decoder layers
    pub n_text_layer: i32,
    /// Mel bins
    pub n_mels: i32,
    /// `QNT_VERSION * QNT_VERSION_FACTOR + file_type`
    pub ftype: i32,
}

impl Default for WhisperHparams {
    /// The `tiny` model shape with f16 weights
    fn default() -> Self {
        Self {
            n_vocab: 51864,
            n_audio_ctx: 1500,
            n_audio_state: 384,
            n_audio_head: 6,
            n_audio_layer: 4,
            n_text_ctx: 448,
            n_text_state: 384,
            n_text_head: 6,
            n_text_layer: 4,
            n_mels: 80,
            ftype: 1,
        }
    }
}

impl WhisperHparams {
    /// Read the eleven header fields
    ///
    /// # Errors
    ///
    /// `FormatError` on truncation.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            n_vocab: read_i32(reader, "n_vocab")?,
            n_audio_ctx: read_i32(reader, "n_audio_ctx")?,
            n_audio_state: read_i32(reader, "n_audio_state")?,
            n_audio_head: read_i32(reader, "n_audio_head")?,
            n_audio_layer: read_i32(reader, "n_audio_layer")?,
            n_text_ctx: read_i32(reader, "n_text_ctx")?,
            n_text_state: read_i32(reader, "n_text_state")?,
            n_text_head: read_i32(reader, "n_text_head")?,
            n_text_layer: read_i32(reader, "n_text_layer")?,
            n_mels: read_i32(reader, "n_mels")?,
            ftype: read_i32(reader, "ftype")?,
        })
    }

    /// Write the eleven header fields
    ///
    /// # Errors
    ///
    /// `IoError` from the writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        for (value, what) in [
            (self.n_vocab, "n_vocab"),
            (self.n_audio_ctx, "n_audio_ctx"),
            (self.n_audio_state, "n_audio_state"),
            (self.n_audio_head, "n_audio_head"),
            (self.n_audio_layer, "n_audio_layer"),
            (self.n_text_ctx, "n_text_ctx"),
            (self.n_text_state, "n_text_state"),
            (self.n_text_head, "n_text_head"),
            (self.n_text_layer, "n_text_layer"),
            (self.n_mels, "n_mels"),
            (self.ftype, "ftype"),
        ] {
            write_i32(writer, value, what)?;
        }
        Ok(())
    }

    /// Quantization version encoded in `ftype`
    pub fn quant_version(&self) -> i32 {
        self.ftype / QNT_VERSION_FACTOR
    }

    /// File type code encoded in `ftype`
    pub fn file_type_code(&self) -> i32 {
        self.ftype % QNT_VERSION_FACTOR
    }

    /// Copy with `ftype` set to the current version and `code`
    pub fn with_file_type(self, code: i32) -> Self {
        Self {
            ftype: QNT_VERSION * QNT_VERSION_FACTOR + code,
            ..self
        }
    }
}

// ============================================================================
// Passthrough sections
// ============================================================================

/// Dimensions of the mel filter bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MelFilters {
    /// Mel bins
    pub n_mel: i32,
    /// FFT bins
    pub n_fft: i32,
}

/// Copy the mel filter section verbatim
///
/// # Errors
///
/// `FormatError` for negative dimensions or truncation.
pub fn copy_mel_filters<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> Result<MelFilters> {
    let n_mel = read_i32(reader, "mel filter n_mel")?;
    let n_fft = read_i32(reader, "mel filter n_fft")?;
    if n_mel < 0 || n_fft < 0 {
        return Err(CuantizarError::format(format!(
            "negative mel filter dimensions {n_mel} x {n_fft}"
        )));
    }
    write_i32(writer, n_mel, "mel filter n_mel")?;
    write_i32(writer, n_fft, "mel filter n_fft")?;

    let len = n_mel as u64 * n_fft as u64 * 4;
    copy_exact(reader, writer, len, "mel filter data")?;
    Ok(MelFilters { n_mel, n_fft })
}

/// Copy the vocabulary section verbatim, returning the token count
///
/// # Errors
///
/// `FormatError` for a negative count or truncation.
pub fn copy_vocab<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> Result<usize> {
    let count = read_i32(reader, "vocab count")?;
    let count = usize::try_from(count)
        .map_err(|_| CuantizarError::format(format!("negative vocab count {count}")))?;
    write_i32(writer, count as i32, "vocab count")?;

    for _ in 0..count {
        let len = read_u32(reader, "vocab token length")?;
        write_u32(writer, len, "vocab token length")?;
        copy_exact(reader, writer, u64::from(len), "vocab token")?;
    }
    Ok(count)
}

// ============================================================================
// Tensor records
// ============================================================================

/// One tensor record: header fields plus its raw payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorRecord {
    /// Tensor name
    pub name: String,
    /// Extents, fastest-varying first
    pub extents: Vec<usize>,
    /// Declared encoding of `payload`
    pub declared: GgmlType,
    /// Raw payload bytes
    pub payload: Vec<u8>,
}

impl Default for TensorRecord {
    fn default() -> Self {
        Self {
            name: String::new(),
            extents: Vec::new(),
            declared: GgmlType::F32,
            payload: Vec::new(),
        }
    }
}

impl TensorRecord {
    /// Record from parts
    pub fn new(name: impl Into<String>, extents: Vec<usize>, declared: GgmlType, payload: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            extents,
            declared,
            payload,
        }
    }

    /// Number of extents
    pub fn rank(&self) -> usize {
        self.extents.len()
    }

    /// Extent of the fastest-varying dimension
    pub fn row_extent(&self) -> usize {
        self.extents.first().copied().unwrap_or(0)
    }

    /// Read the next record into `self`, reusing its buffers
    ///
    /// Returns `false` at a clean end of file.
    ///
    /// # Errors
    ///
    /// `FormatError` for truncation, out-of-range rank, name length or
    /// extents, a non-UTF-8 name, or an unknown type id.
    pub fn read_next<R: Read>(&mut self, reader: &mut R, policy: &BufferSizePolicy<'_>) -> Result<bool> {
        let Some(rank) = read_i32_or_eof(reader, "tensor rank")? else {
            return Ok(false);
        };
        let name_len = read_i32(reader, "tensor name length")?;
        let type_id = read_i32(reader, "tensor type")?;

        let rank = usize::try_from(rank)
            .ok()
            .filter(|r| (1..=MAX_TENSOR_RANK).contains(r))
            .ok_or_else(|| {
                CuantizarError::format(format!("tensor rank {rank} outside 1..={MAX_TENSOR_RANK}"))
            })?;
        let name_len = usize::try_from(name_len)
            .ok()
            .filter(|n| (1..=MAX_TENSOR_NAME_LEN).contains(n))
            .ok_or_else(|| {
                CuantizarError::format(format!(
                    "tensor name length {name_len} outside 1..={MAX_TENSOR_NAME_LEN}"
                ))
            })?;

        self.extents.clear();
        for _ in 0..rank {
            let extent = read_i32(reader, "tensor extent")?;
            let extent = usize::try_from(extent)
                .map_err(|_| CuantizarError::format(format!("negative tensor extent {extent}")))?;
            self.extents.push(extent);
        }

        let mut name = vec![0u8; name_len];
        read_bytes(reader, &mut name, "tensor name")?;
        self.name = String::from_utf8(name)
            .map_err(|_| CuantizarError::format("tensor name is not valid UTF-8"))?;

        self.declared = u32::try_from(type_id)
            .ok()
            .and_then(|id| policy.catalog().by_id(id))
            .map(|d| d.ty)
            .ok_or_else(|| {
                CuantizarError::format(format!(
                    "tensor '{}' declares unknown type id {type_id}",
                    self.name
                ))
            })?;

        // Grow with the data actually present; extents can claim any size.
        let size = policy.tensor_byte_size(self.declared, &self.extents)?;
        self.payload.clear();
        let read = reader
            .by_ref()
            .take(size as u64)
            .read_to_end(&mut self.payload)
            .map_err(|e| CuantizarError::io(format!("read payload of tensor '{}'", self.name), e))?;
        if read != size {
            return Err(CuantizarError::format(format!(
                "truncated file while reading payload of tensor '{}': expected {size} bytes, got {read}",
                self.name
            )));
        }

        debug!(
            tensor = %self.name,
            extents = ?self.extents,
            declared = %self.declared,
            bytes = size,
            "read tensor record"
        );
        Ok(true)
    }

    /// Write this record unchanged
    ///
    /// # Errors
    ///
    /// `IoError` from the writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_tensor(writer, &self.name, &self.extents, self.declared, &self.payload)
    }
}

/// Write one tensor record
///
/// # Errors
///
/// `FormatError` if a field does not fit in i32, `IoError` from the writer.
pub fn write_tensor<W: Write>(
    writer: &mut W,
    name: &str,
    extents: &[usize],
    declared: GgmlType,
    payload: &[u8],
) -> Result<()> {
    let to_i32 = |value: usize, what: &str| {
        i32::try_from(value).map_err(|_| CuantizarError::format(format!("{what} {value} exceeds i32")))
    };

    write_i32(writer, to_i32(extents.len(), "tensor rank")?, "tensor rank")?;
    write_i32(writer, to_i32(name.len(), "tensor name length")?, "tensor name length")?;
    write_u32(writer, declared.id(), "tensor type")?;
    for &extent in extents {
        write_i32(writer, to_i32(extent, "tensor extent")?, "tensor extent")?;
    }
    write_bytes(writer, name.as_bytes(), "tensor name")?;
    write_bytes(writer, payload, "tensor payload")
}
