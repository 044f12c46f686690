//! Per-tensor decision log and end-of-run summary

use std::collections::BTreeMap;

use serde::Serialize;

use crate::catalog::GgmlType;
use crate::format::WhisperHparams;

const MB: f64 = 1024.0 * 1024.0;

/// Why a tensor ended up with its output type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Named by the skip list; copied verbatim
    Skipped,
    /// Rank other than 2; copied verbatim
    NotMatrix,
    /// Re-encoded to a rule's or the default target
    Transformed,
}

/// Outcome for one tensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TensorDecision {
    /// Tensor name
    pub name: String,
    /// Extents as read
    pub extents: Vec<usize>,
    /// Declared type in the input
    pub source_type: GgmlType,
    /// Declared type in the output
    pub result_type: GgmlType,
    /// Payload bytes in the input
    pub source_bytes: usize,
    /// Payload bytes in the output
    pub result_bytes: usize,
    /// Decision path
    pub kind: DecisionKind,
    /// Index of the winning rule, `None` for the default or a verbatim copy
    pub matched_rule: Option<usize>,
}

impl TensorDecision {
    /// One human-readable log line
    pub fn render(&self) -> String {
        let extents = self
            .extents
            .iter()
            .map(|e| format!("{e:5}"))
            .collect::<Vec<_>>()
            .join(", ");
        let origin = match (self.kind, self.matched_rule) {
            (DecisionKind::Skipped, _) => "skipped".to_string(),
            (DecisionKind::NotMatrix, _) => "copied".to_string(),
            (DecisionKind::Transformed, Some(i)) => format!("rule #{i}"),
            (DecisionKind::Transformed, None) => "default".to_string(),
        };
        format!(
            "{:>48} - [{extents}], type = {:>6}, size = {:8.3} MB -> {:8.3} MB, type = {:>6} ({origin})",
            self.name,
            self.source_type.name(),
            self.source_bytes as f64 / MB,
            self.result_bytes as f64 / MB,
            self.result_type.name(),
        )
    }
}

/// Totals for a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscodeReport {
    /// Hyperparameters as written (with the rewritten `ftype`)
    pub hparams: WhisperHparams,
    /// Type the header declares for weight buffers
    pub header_type: GgmlType,
    /// Number of tensor-type rules in effect
    pub rule_count: usize,
    /// Vocabulary entries copied
    pub vocab_size: usize,
    /// Tensors written
    pub tensor_count: usize,
    /// Tensors that were re-encoded
    pub transformed_count: usize,
    /// Sum of input payload sizes
    pub source_bytes: u64,
    /// Sum of output payload sizes
    pub result_bytes: u64,
    /// Tensor count per output type
    pub tally: BTreeMap<GgmlType, usize>,
}

impl TranscodeReport {
    /// Empty report for a run writing `hparams`
    pub fn new(hparams: WhisperHparams, header_type: GgmlType, rule_count: usize) -> Self {
        Self {
            hparams,
            header_type,
            rule_count,
            vocab_size: 0,
            tensor_count: 0,
            transformed_count: 0,
            source_bytes: 0,
            result_bytes: 0,
            tally: BTreeMap::new(),
        }
    }

    /// Account for one tensor
    pub fn record(&mut self, decision: &TensorDecision) {
        self.tensor_count += 1;
        if decision.kind == DecisionKind::Transformed {
            self.transformed_count += 1;
        }
        self.source_bytes += decision.source_bytes as u64;
        self.result_bytes += decision.result_bytes as u64;
        *self.tally.entry(decision.result_type).or_insert(0) += 1;
    }

    /// Summary lines printed at the end of a run
    pub fn summary_lines(&self) -> Vec<String> {
        let mode = if self.rule_count > 0 {
            format!("{} (mixed precision, {} rules)", self.header_type, self.rule_count)
        } else {
            self.header_type.to_string()
        };
        let mut lines = vec![
            format!("model size  = {:8.2} MB", self.source_bytes as f64 / MB),
            format!("quant size  = {:8.2} MB | base type = {mode}", self.result_bytes as f64 / MB),
            format!(
                "tensors     = {} ({} re-encoded)",
                self.tensor_count, self.transformed_count
            ),
            "type summary:".to_string(),
        ];
        lines.extend(
            self.tally
                .iter()
                .map(|(ty, count)| format!("  {:>6}: {count} tensors", ty.name())),
        );
        lines
    }
}
