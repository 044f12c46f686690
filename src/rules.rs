//! Ordered tensor-name rules and the skip list
//!
//! A [`PatternRuleSet`] maps tensor names to target encodings. Patterns are
//! regular expressions matched against the *whole* name; rules are tried in
//! the order given and the first match wins, even when a later rule is more
//! specific. Substring matching has to be spelled out as `.*pattern.*`.
//!
//! A [`SkipSpec`] lists tensors that are never transformed. It is consulted
//! before any rule, so a skipped tensor stays verbatim even if a rule names it.

use regex::Regex;
use tracing::debug;

use crate::catalog::{GgmlType, TypeCatalog};
use crate::error::{CuantizarError, Result};

/// Tensors a Whisper model needs at their stored precision
pub const WHISPER_SKIP_PATTERNS: [&str; 4] = [
    "encoder.conv1.bias",
    "encoder.conv2.bias",
    "encoder.positional_embedding",
    "decoder.positional_embedding",
];

/// Compile `pattern` so it only matches a complete tensor name
fn compile_full_match(pattern: &str) -> Result<Regex> {
    // "a)(b" compiles once wrapped, so check the bare pattern too.
    Regex::new(pattern).map_err(|e| CuantizarError::PatternCompile {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    Regex::new(&format!("^(?:{pattern})$")).map_err(|e| CuantizarError::PatternCompile {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// One `PATTERN=TYPE` assignment, uncompiled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizationRule {
    /// Regular expression matched against the full tensor name
    pub pattern: String,
    /// Encoding for matching tensors
    pub target: GgmlType,
}

impl QuantizationRule {
    /// Create a rule from parts
    pub fn new(pattern: impl Into<String>, target: GgmlType) -> Self {
        Self {
            pattern: pattern.into(),
            target,
        }
    }

    /// Parse `PATTERN=TYPE`, splitting at the first `=`
    ///
    /// The pattern cannot contain `=`: `a=b=q4_0` names pattern `a` and type
    /// `b=q4_0`, which is rejected.
    ///
    /// # Errors
    ///
    /// `ArgumentError` if there is no `=` or either side is empty,
    /// `UnknownType` if TYPE is not a selectable catalog name, and
    /// `ArgumentError` for an `f32` target.
    pub fn parse(text: &str, catalog: &TypeCatalog) -> Result<Self> {
        let (pattern, type_name) = text
            .split_once('=')
            .ok_or_else(|| CuantizarError::argument(text, "expected PATTERN=TYPE"))?;

        if pattern.is_empty() {
            return Err(CuantizarError::argument(text, "empty pattern"));
        }
        if type_name.is_empty() {
            return Err(CuantizarError::argument(text, "empty type"));
        }

        let target = catalog.resolve(type_name)?.ty;
        if target == GgmlType::F32 {
            return Err(CuantizarError::argument(
                text,
                "f32 tensors would not fit the f16 allocation used for mixed-precision files",
            ));
        }
        Ok(Self::new(pattern, target))
    }
}

/// The winning rule for a tensor name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMatch {
    /// Position of the rule in argument order
    pub index: usize,
    /// The rule's target encoding
    pub target: GgmlType,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: QuantizationRule,
    regex: Regex,
}

/// Ordered, pre-compiled rule list
#[derive(Debug, Clone, Default)]
pub struct PatternRuleSet {
    rules: Vec<CompiledRule>,
}

impl PatternRuleSet {
    /// Rule set with no rules
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile every rule, keeping argument order
    ///
    /// # Errors
    ///
    /// `PatternCompile` naming the first pattern that fails.
    pub fn compile(rules: Vec<QuantizationRule>) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let regex = compile_full_match(&rule.pattern)?;
            debug!(pattern = %rule.pattern, target = %rule.target, "compiled tensor rule");
            compiled.push(CompiledRule { rule, regex });
        }
        Ok(Self { rules: compiled })
    }

    /// Parse and compile `PATTERN=TYPE` arguments in order
    ///
    /// Every argument is parsed before any pattern is compiled, so a bad type
    /// name is reported even when an earlier pattern is malformed.
    ///
    /// # Errors
    ///
    /// See [`QuantizationRule::parse`] and [`PatternRuleSet::compile`].
    pub fn parse_all<S: AsRef<str>>(args: &[S], catalog: &TypeCatalog) -> Result<Self> {
        let rules = args
            .iter()
            .map(|arg| QuantizationRule::parse(arg.as_ref(), catalog))
            .collect::<Result<Vec<_>>>()?;
        Self::compile(rules)
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in evaluation order
    pub fn rules(&self) -> impl Iterator<Item = &QuantizationRule> {
        self.rules.iter().map(|c| &c.rule)
    }

    /// First rule whose pattern matches the whole of `name`
    #[doc(alias = "match")]
    pub fn find(&self, name: &str) -> Option<RuleMatch> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, c)| c.regex.is_match(name))
            .map(|(index, c)| RuleMatch {
                index,
                target: c.rule.target,
            })
    }
}

/// Tensors that are always copied verbatim
#[derive(Debug, Clone)]
pub struct SkipSpec {
    patterns: Vec<(String, Regex)>,
}

impl SkipSpec {
    /// Skip list for Whisper models
    ///
    /// # Errors
    ///
    /// Never in practice; the fixed patterns are valid regular expressions.
    pub fn whisper() -> Result<Self> {
        Self::new(WHISPER_SKIP_PATTERNS)
    }

    /// Skip list from caller-supplied full-match patterns
    ///
    /// # Errors
    ///
    /// `PatternCompile` naming the first pattern that fails.
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                compile_full_match(p).map(|re| (p.to_string(), re))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Skip nothing
    pub fn none() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Whether `name` must be copied verbatim
    pub fn is_skipped(&self, name: &str) -> bool {
        self.patterns.iter().any(|(_, re)| re.is_match(name))
    }

    /// Pattern texts
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|(p, _)| p.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(specs: &[(&str, GgmlType)]) -> PatternRuleSet {
        PatternRuleSet::compile(
            specs
                .iter()
                .map(|(p, t)| QuantizationRule::new(*p, *t))
                .collect(),
        )
        .expect("compile")
    }

    #[test]
    fn test_first_match_wins_over_more_specific() {
        let set = rules(&[
            (r"encoder\..*", GgmlType::Q8_0),
            (r"encoder\.blocks\.0\..*", GgmlType::Q4_0),
        ]);
        let hit = set.find("encoder.blocks.0.attn.weight").expect("match");
        assert_eq!(hit.target, GgmlType::Q8_0);
        assert_eq!(hit.index, 0);
    }

    #[test]
    fn test_match_is_anchored() {
        let set = rules(&[("attn", GgmlType::Q4_0)]);
        assert!(set.find("encoder.blocks.0.attn.weight").is_none());
        assert!(set.find("attn").is_some());

        let set = rules(&[(".*attn.*", GgmlType::Q4_0)]);
        assert!(set.find("encoder.blocks.0.attn.weight").is_some());
    }

    #[test]
    fn test_alternation_stays_anchored() {
        let set = rules(&[("a|b", GgmlType::Q4_0)]);
        assert!(set.find("a").is_some());
        assert!(set.find("b").is_some());
        assert!(set.find("ab").is_none());
        assert!(set.find("xa").is_none());
    }

    #[test]
    fn test_later_rule_used_when_earlier_misses() {
        let set = rules(&[
            (r"decoder\..*", GgmlType::Q4_K),
            (r"encoder\..*", GgmlType::Q5_0),
        ]);
        let hit = set.find("encoder.ln_post.weight").expect("match");
        assert_eq!(hit.index, 1);
        assert_eq!(hit.target, GgmlType::Q5_0);
    }

    #[test]
    fn test_parse_splits_at_first_equals() {
        let catalog = TypeCatalog::new();
        let rule = QuantizationRule::parse(r"encoder\..*=Q8_0", &catalog).expect("parse");
        assert_eq!(rule.pattern, r"encoder\..*");
        assert_eq!(rule.target, GgmlType::Q8_0);

        let err = QuantizationRule::parse("a=b=q4_0", &catalog).unwrap_err();
        assert!(matches!(err, CuantizarError::UnknownType { ref name } if name == "b=q4_0"));
    }

    #[test]
    fn test_parse_rejects_missing_separator() {
        let catalog = TypeCatalog::new();
        for text in ["encoder", "=q4_0", "encoder="] {
            let err = QuantizationRule::parse(text, &catalog).unwrap_err();
            assert!(matches!(err, CuantizarError::ArgumentError { .. }), "{text}");
        }
    }

    #[test]
    fn test_parse_unknown_type() {
        let catalog = TypeCatalog::new();
        let err = QuantizationRule::parse(".*=q9_bogus", &catalog).unwrap_err();
        assert!(matches!(err, CuantizarError::UnknownType { ref name } if name == "q9_bogus"));
    }

    #[test]
    fn test_parse_f16_allowed_f32_rejected() {
        let catalog = TypeCatalog::new();
        assert_eq!(
            QuantizationRule::parse(".*=f16", &catalog).expect("f16").target,
            GgmlType::F16
        );
        assert!(matches!(
            QuantizationRule::parse(".*=f32", &catalog),
            Err(CuantizarError::ArgumentError { .. })
        ));
    }

    #[test]
    fn test_bad_pattern_reports_text() {
        let err = PatternRuleSet::compile(vec![QuantizationRule::new("enc(", GgmlType::Q4_0)]).unwrap_err();
        assert!(matches!(err, CuantizarError::PatternCompile { ref pattern, .. } if pattern == "enc("));

        let err = PatternRuleSet::compile(vec![QuantizationRule::new("a)(b", GgmlType::Q4_0)]).unwrap_err();
        assert!(matches!(err, CuantizarError::PatternCompile { .. }));
    }

    #[test]
    fn test_parse_all_reports_type_before_pattern() {
        let catalog = TypeCatalog::new();
        let err = PatternRuleSet::parse_all(&["enc(=q4_0", ".*=q9_bogus"], &catalog).unwrap_err();
        assert!(matches!(err, CuantizarError::UnknownType { .. }));
    }

    #[test]
    fn test_whisper_skip_list() {
        let skip = SkipSpec::whisper().expect("skip");
        assert!(skip.is_skipped("encoder.conv1.bias"));
        assert!(skip.is_skipped("decoder.positional_embedding"));
        assert!(!skip.is_skipped("encoder.conv1.weight"));
        assert!(!skip.is_skipped("xencoder.conv1.bias"));
        assert_eq!(skip.patterns().count(), 4);
    }

    #[test]
    fn test_custom_skip_list() {
        let skip = SkipSpec::new(["decoder.token_embedding.weight"]).expect("skip");
        assert!(skip.is_skipped("decoder.token_embedding.weight"));
        assert!(!SkipSpec::none().is_skipped("decoder.token_embedding.weight"));
    }

    #[test]
    fn test_empty_rule_set() {
        let set = PatternRuleSet::empty();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
        assert!(set.find("anything").is_none());
    }
}
