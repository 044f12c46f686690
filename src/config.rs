//! Validated run configuration
//!
//! Everything the transcoder needs, resolved up front. Argument problems
//! (bad rules, unknown types, bad patterns, same input and output) surface
//! here, before any file is opened.

use std::path::PathBuf;

use tracing::debug;

use crate::catalog::{GgmlType, TypeCatalog};
use crate::error::{CuantizarError, Result};
use crate::rules::{PatternRuleSet, SkipSpec};

/// One transcoding run
#[derive(Debug, Clone)]
pub struct QuantizeConfig {
    /// Source model
    pub input: PathBuf,
    /// Destination model; created or truncated
    pub output: PathBuf,
    /// Target for matrices no rule claims
    pub default_type: GgmlType,
    /// Ordered tensor-type rules
    pub rules: PatternRuleSet,
    /// Tensors copied verbatim
    pub skip: SkipSpec,
}

impl QuantizeConfig {
    /// Build a configuration from command-line values
    ///
    /// `default_type` is a file-type name or numeric code; `tensor_types` are
    /// `PATTERN=TYPE` rules in priority order. The Whisper skip list applies.
    ///
    /// # Errors
    ///
    /// `ArgumentError`, `UnknownType` or `PatternCompile` for bad values.
    pub fn new<S: AsRef<str>>(
        catalog: &TypeCatalog,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        default_type: &str,
        tensor_types: &[S],
    ) -> Result<Self> {
        let input = input.into();
        let output = output.into();
        if input == output {
            return Err(CuantizarError::argument(
                output.display().to_string(),
                "output must differ from input",
            ));
        }

        let rules = PatternRuleSet::parse_all(tensor_types, catalog)?;
        let default_type = catalog.resolve_file_type(default_type)?;
        debug!(default = %default_type, rules = rules.len(), "resolved configuration");

        Ok(Self {
            input,
            output,
            default_type,
            rules,
            skip: SkipSpec::whisper()?,
        })
    }

    /// Replace the skip list
    pub fn with_skip(self, skip: SkipSpec) -> Self {
        Self { skip, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_resolves_names_and_codes() {
        let catalog = TypeCatalog::new();
        let by_name = QuantizeConfig::new(&catalog, "in.bin", "out.bin", "q5_1", &[r"encoder\..*=q8_0"])
            .expect("config");
        assert_eq!(by_name.default_type, GgmlType::Q5_1);
        assert_eq!(by_name.rules.len(), 1);
        assert!(by_name.skip.is_skipped("encoder.conv1.bias"));

        let by_code = QuantizeConfig::new::<&str>(&catalog, "in.bin", "out.bin", "12", &[]).expect("config");
        assert_eq!(by_code.default_type, GgmlType::Q4_K);
        assert!(by_code.rules.is_empty());
    }

    #[test]
    fn test_same_path_rejected() {
        let catalog = TypeCatalog::new();
        let err = QuantizeConfig::new::<&str>(&catalog, "m.bin", "m.bin", "q4_0", &[]).unwrap_err();
        assert!(matches!(err, CuantizarError::ArgumentError { .. }));
    }

    #[test]
    fn test_unknown_rule_type_reported_before_default() {
        let catalog = TypeCatalog::new();
        let err = QuantizeConfig::new(&catalog, "in.bin", "out.bin", "bogus", &[".*=q9_x"]).unwrap_err();
        assert!(matches!(err, CuantizarError::UnknownType { ref name } if name == "q9_x"));
    }

    #[test]
    fn test_non_quantized_default_rejected() {
        let catalog = TypeCatalog::new();
        assert!(QuantizeConfig::new::<&str>(&catalog, "in.bin", "out.bin", "f16", &[]).is_err());
    }

    #[test]
    fn test_with_skip() {
        let catalog = TypeCatalog::new();
        let config = QuantizeConfig::new::<&str>(&catalog, "in.bin", "out.bin", "q4_0", &[])
            .expect("config")
            .with_skip(SkipSpec::none());
        assert!(!config.skip.is_skipped("encoder.conv1.bias"));
    }
}
