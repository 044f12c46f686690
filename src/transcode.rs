//! Streaming per-tensor transcoder
//!
//! Reads a model file front to back and writes the transformed copy as it
//! goes. At most one tensor's payload (plus its decoded floats and encoded
//! bytes) is held at a time; the three buffers are reused across tensors.
//!
//! Per-tensor decision, in order:
//! 1. name on the skip list: verbatim copy
//! 2. rank other than 2: verbatim copy
//! 3. first matching rule, else the run default, picks the target
//! 4. source must be f32 or f16, and quantized targets need block-aligned
//!    rows; the payload is decoded and re-encoded
//!
//! Every error aborts the run. Output already written is left in place and
//! must be discarded by the caller.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::catalog::{FileType, GgmlType, TypeCatalog};
use crate::config::QuantizeConfig;
use crate::error::{CuantizarError, Result};
use crate::format::{self, TensorRecord, WhisperHparams};
use crate::policy::BufferSizePolicy;
use crate::quantize;
use crate::report::{DecisionKind, TensorDecision, TranscodeReport};
use crate::rules::{PatternRuleSet, SkipSpec};

/// What happens to one tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// On the skip list
    Skip,
    /// Not a matrix
    NotMatrix,
    /// Re-encode to `target`; `rule` is the winning rule's index
    Transform {
        /// Output encoding
        target: GgmlType,
        /// Winning rule, `None` for the default
        rule: Option<usize>,
    },
}

/// Per-tensor pipeline bound to one run's catalog, rules and skip list
#[derive(Debug, Clone, Copy)]
pub struct TensorStreamTranscoder<'a> {
    policy: BufferSizePolicy<'a>,
    rules: &'a PatternRuleSet,
    skip: &'a SkipSpec,
    default_type: GgmlType,
}

impl<'a> TensorStreamTranscoder<'a> {
    /// Transcoder for one run
    pub fn new(
        catalog: &'a TypeCatalog,
        rules: &'a PatternRuleSet,
        skip: &'a SkipSpec,
        default_type: GgmlType,
    ) -> Self {
        Self {
            policy: BufferSizePolicy::new(catalog),
            rules,
            skip,
            default_type,
        }
    }

    /// Transcoder for a validated configuration
    pub fn from_config(catalog: &'a TypeCatalog, config: &'a QuantizeConfig) -> Self {
        Self::new(catalog, &config.rules, &config.skip, config.default_type)
    }

    /// Type the output header declares
    pub fn header_type(&self) -> GgmlType {
        self.policy
            .header_fallback_type(self.rules.len(), self.default_type)
    }

    /// Decide what happens to a tensor from its name and rank
    pub fn decide(&self, name: &str, rank: usize) -> Action {
        if self.skip.is_skipped(name) {
            return Action::Skip;
        }
        if rank != 2 {
            return Action::NotMatrix;
        }
        match self.rules.find(name) {
            Some(hit) => Action::Transform {
                target: hit.target,
                rule: Some(hit.index),
            },
            None => Action::Transform {
                target: self.default_type,
                rule: None,
            },
        }
    }

    /// Transcode a whole file, starting at the magic
    ///
    /// `on_decision` sees every tensor's decision in file order, after the
    /// tensor has been written.
    ///
    /// # Errors
    ///
    /// Any error from reading, validation, encoding or writing.
    pub fn transcode<R, W, F>(&self, input: &mut R, output: &mut W, on_decision: F) -> Result<TranscodeReport>
    where
        R: Read,
        W: Write,
        F: FnMut(&TensorDecision),
    {
        format::read_magic(input)?;
        self.transcode_after_magic(input, output, on_decision)
    }

    /// Transcode a file whose magic has already been read and checked
    ///
    /// # Errors
    ///
    /// Any error from reading, validation, encoding or writing.
    pub fn transcode_after_magic<R, W, F>(
        &self,
        input: &mut R,
        output: &mut W,
        mut on_decision: F,
    ) -> Result<TranscodeReport>
    where
        R: Read,
        W: Write,
        F: FnMut(&TensorDecision),
    {
        let header_type = self.header_type();
        let file_type = FileType::for_tensor_type(header_type).ok_or_else(|| {
            CuantizarError::argument(header_type.name(), "type has no file type code")
        })?;

        let hparams = WhisperHparams::read(input)?;
        info!(
            n_vocab = hparams.n_vocab,
            n_audio_state = hparams.n_audio_state,
            n_audio_layer = hparams.n_audio_layer,
            n_text_state = hparams.n_text_state,
            n_text_layer = hparams.n_text_layer,
            n_mels = hparams.n_mels,
            ftype = hparams.ftype,
            "read model header"
        );
        let written = hparams.with_file_type(file_type.code());
        format::write_magic(output)?;
        written.write(output)?;
        info!(ftype_src = hparams.ftype, ftype_dst = written.ftype, header_type = %header_type, "rewrote header type");

        let mel = format::copy_mel_filters(input, output)?;
        debug!(n_mel = mel.n_mel, n_fft = mel.n_fft, "copied mel filters");

        let mut report = TranscodeReport::new(written, header_type, self.rules.len());
        report.vocab_size = format::copy_vocab(input, output)?;
        debug!(tokens = report.vocab_size, "copied vocabulary");

        let mut record = TensorRecord::default();
        let mut floats = Vec::new();
        let mut encoded = Vec::new();
        while record.read_next(input, &self.policy)? {
            let decision = self.transcode_record(&record, &mut floats, &mut encoded, output)?;
            report.record(&decision);
            on_decision(&decision);
        }

        info!(
            tensors = report.tensor_count,
            transformed = report.transformed_count,
            "finished tensor stream"
        );
        Ok(report)
    }

    fn transcode_record<W: Write>(
        &self,
        record: &TensorRecord,
        floats: &mut Vec<f32>,
        encoded: &mut Vec<u8>,
        output: &mut W,
    ) -> Result<TensorDecision> {
        let action = self.decide(&record.name, record.rank());
        let (kind, result_type, result_bytes, matched_rule) = match action {
            Action::Skip | Action::NotMatrix => {
                record.write(output)?;
                let kind = if action == Action::Skip {
                    DecisionKind::Skipped
                } else {
                    DecisionKind::NotMatrix
                };
                (kind, record.declared, record.payload.len(), None)
            },
            Action::Transform { target, rule } => {
                self.encode_record(record, target, floats, encoded)?;
                format::write_tensor(output, &record.name, &record.extents, target, encoded)?;
                (DecisionKind::Transformed, target, encoded.len(), rule)
            },
        };

        Ok(TensorDecision {
            name: record.name.clone(),
            extents: record.extents.clone(),
            source_type: record.declared,
            result_type,
            source_bytes: record.payload.len(),
            result_bytes,
            kind,
            matched_rule,
        })
    }

    fn encode_record(
        &self,
        record: &TensorRecord,
        target: GgmlType,
        floats: &mut Vec<f32>,
        encoded: &mut Vec<u8>,
    ) -> Result<()> {
        if !matches!(record.declared, GgmlType::F32 | GgmlType::F16) {
            return Err(CuantizarError::UnsupportedSourceType {
                tensor: record.name.clone(),
                type_name: record.declared.name().to_string(),
            });
        }

        let row = record.row_extent();
        let (elements_per_block, _) = target.geometry();
        if row % elements_per_block != 0 {
            return Err(CuantizarError::InvalidShape {
                reason: format!(
                    "tensor '{}': row extent {row} is not a multiple of the {target} block size {elements_per_block}",
                    record.name
                ),
            });
        }

        quantize::decode_into(record.declared, &record.payload, floats)?;
        quantize::encode_into(target, floats, row, encoded)?;
        debug!(
            tensor = %record.name,
            source = %record.declared,
            target = %target,
            bytes_in = record.payload.len(),
            bytes_out = encoded.len(),
            "re-encoded tensor"
        );
        Ok(())
    }
}

/// Transcode `config.input` into `config.output`
///
/// The input is opened and its magic checked before the output is created.
/// Writes go straight to the output path.
///
/// # Errors
///
/// `IoError` for open/create/flush failures, plus anything from
/// [`TensorStreamTranscoder::transcode`].
pub fn quantize_model<F>(catalog: &TypeCatalog, config: &QuantizeConfig, on_decision: F) -> Result<TranscodeReport>
where
    F: FnMut(&TensorDecision),
{
    let mut reader = BufReader::new(open_input(&config.input)?);
    format::read_magic(&mut reader)?;

    let output = File::create(&config.output)
        .map_err(|e| CuantizarError::io(format!("create output '{}'", config.output.display()), e))?;
    let mut writer = BufWriter::new(output);

    let transcoder = TensorStreamTranscoder::from_config(catalog, config);
    let report = transcoder.transcode_after_magic(&mut reader, &mut writer, on_decision)?;
    writer
        .flush()
        .map_err(|e| CuantizarError::io(format!("flush output '{}'", config.output.display()), e))?;
    Ok(report)
}

fn open_input(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| CuantizarError::io(format!("open input '{}'", path.display()), e))
}
