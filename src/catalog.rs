//! Type catalog: tensor encodings and their block geometry
//!
//! Every encoding a tensor record can declare is a variant of [`GgmlType`].
//! The variant carries its numeric id, its name, and its block geometry, so
//! size computation and codec dispatch hang off one tagged value instead of
//! scattered switches over raw ids.
//!
//! ## Geometry
//!
//! | Type   | Id | Elements/block | Bytes/block | Family      |
//! |--------|----|----------------|-------------|-------------|
//! | `F32`  | 0  | 1              | 4           | Float       |
//! | `F16`  | 1  | 1              | 2           | Float       |
//! | `Q4_0` | 2  | 32             | 18          | Simple      |
//! | `Q4_1` | 3  | 32             | 20          | Simple      |
//! | `Q5_0` | 6  | 32             | 22          | Simple      |
//! | `Q5_1` | 7  | 32             | 24          | Simple      |
//! | `Q8_0` | 8  | 32             | 34          | Simple      |
//! | `Q2_K` | 10 | 256            | 84          | KQuant      |
//! | `Q3_K` | 11 | 256            | 110         | KQuant      |
//! | `Q4_K` | 12 | 256            | 144         | KQuant      |
//! | `Q5_K` | 13 | 256            | 176         | KQuant      |
//! | `Q6_K` | 14 | 256            | 210         | KQuant      |
//!
//! A handful of storage-only types (`Q8_1`, `Q8_K`, integer and `BF16`
//! tensors) are recognised so verbatim copies can be sized, but they cannot be
//! selected by name as a quantization target.
//!
//! The catalog is an ordinary value. Each run builds its own and passes it by
//! reference; nothing here is process-wide.

use serde::{Serialize, Serializer};

use crate::error::{CuantizarError, Result};

/// Tensor encoding, numbered as in GGML
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(non_camel_case_types)]
pub enum GgmlType {
    /// 32-bit IEEE float
    F32,
    /// 16-bit IEEE float
    F16,
    /// 4-bit, one f16 scale per 32 elements
    Q4_0,
    /// 4-bit, f16 scale and min per 32 elements
    Q4_1,
    /// 5-bit, one f16 scale per 32 elements
    Q5_0,
    /// 5-bit, f16 scale and min per 32 elements
    Q5_1,
    /// 8-bit, one f16 scale per 32 elements
    Q8_0,
    /// 8-bit with block sums (storage only)
    Q8_1,
    /// 2-bit K-quant super-block
    Q2_K,
    /// 3-bit K-quant super-block
    Q3_K,
    /// 4-bit K-quant super-block
    Q4_K,
    /// 5-bit K-quant super-block
    Q5_K,
    /// 6-bit K-quant super-block
    Q6_K,
    /// 8-bit K-quant super-block (storage only)
    Q8_K,
    /// 8-bit integer (storage only)
    I8,
    /// 16-bit integer (storage only)
    I16,
    /// 32-bit integer (storage only)
    I32,
    /// 64-bit integer (storage only)
    I64,
    /// 64-bit float (storage only)
    F64,
    /// bfloat16 (storage only)
    BF16,
}

/// Storage layout family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantFamily {
    /// One element per "block", no shared scale
    Float,
    /// 32-element blocks with a single scale (and optional min)
    Simple,
    /// 256-element super-blocks with sub-block scales
    KQuant,
    /// Recognised for sizing only
    Storage,
}

/// Geometry and identity of one encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeDescriptor {
    /// The encoding
    pub ty: GgmlType,
    /// Lowercase catalog name
    pub name: &'static str,
    /// Elements sharing one block
    pub elements_per_block: usize,
    /// Bytes occupied by one block
    pub bytes_per_block: usize,
    /// Whether the encoding is a lossy block quantization
    pub is_quantized: bool,
}

impl TypeDescriptor {
    /// Numeric type id as stored in tensor records
    pub fn id(&self) -> u32 {
        self.ty.id()
    }

    /// Effective storage footprint of one element in bytes
    pub fn bytes_per_element(&self) -> f64 {
        self.bytes_per_block as f64 / self.elements_per_block as f64
    }
}

impl GgmlType {
    /// Every variant, in id order
    pub const ALL: [GgmlType; 20] = [
        GgmlType::F32,
        GgmlType::F16,
        GgmlType::Q4_0,
        GgmlType::Q4_1,
        GgmlType::Q5_0,
        GgmlType::Q5_1,
        GgmlType::Q8_0,
        GgmlType::Q8_1,
        GgmlType::Q2_K,
        GgmlType::Q3_K,
        GgmlType::Q4_K,
        GgmlType::Q5_K,
        GgmlType::Q6_K,
        GgmlType::Q8_K,
        GgmlType::I8,
        GgmlType::I16,
        GgmlType::I32,
        GgmlType::I64,
        GgmlType::F64,
        GgmlType::BF16,
    ];

    /// Numeric id as stored in tensor records
    pub const fn id(self) -> u32 {
        match self {
            GgmlType::F32 => 0,
            GgmlType::F16 => 1,
            GgmlType::Q4_0 => 2,
            GgmlType::Q4_1 => 3,
            GgmlType::Q5_0 => 6,
            GgmlType::Q5_1 => 7,
            GgmlType::Q8_0 => 8,
            GgmlType::Q8_1 => 9,
            GgmlType::Q2_K => 10,
            GgmlType::Q3_K => 11,
            GgmlType::Q4_K => 12,
            GgmlType::Q5_K => 13,
            GgmlType::Q6_K => 14,
            GgmlType::Q8_K => 15,
            GgmlType::I8 => 24,
            GgmlType::I16 => 25,
            GgmlType::I32 => 26,
            GgmlType::I64 => 27,
            GgmlType::F64 => 28,
            GgmlType::BF16 => 30,
        }
    }

    /// Lowercase name
    pub const fn name(self) -> &'static str {
        match self {
            GgmlType::F32 => "f32",
            GgmlType::F16 => "f16",
            GgmlType::Q4_0 => "q4_0",
            GgmlType::Q4_1 => "q4_1",
            GgmlType::Q5_0 => "q5_0",
            GgmlType::Q5_1 => "q5_1",
            GgmlType::Q8_0 => "q8_0",
            GgmlType::Q8_1 => "q8_1",
            GgmlType::Q2_K => "q2_k",
            GgmlType::Q3_K => "q3_k",
            GgmlType::Q4_K => "q4_k",
            GgmlType::Q5_K => "q5_k",
            GgmlType::Q6_K => "q6_k",
            GgmlType::Q8_K => "q8_k",
            GgmlType::I8 => "i8",
            GgmlType::I16 => "i16",
            GgmlType::I32 => "i32",
            GgmlType::I64 => "i64",
            GgmlType::F64 => "f64",
            GgmlType::BF16 => "bf16",
        }
    }

    /// `(elements_per_block, bytes_per_block)`
    pub const fn geometry(self) -> (usize, usize) {
        match self {
            GgmlType::F32 => (1, 4),
            GgmlType::F16 => (1, 2),
            GgmlType::Q4_0 => (32, 18),
            GgmlType::Q4_1 => (32, 20),
            GgmlType::Q5_0 => (32, 22),
            GgmlType::Q5_1 => (32, 24),
            GgmlType::Q8_0 => (32, 34),
            GgmlType::Q8_1 => (32, 36),
            GgmlType::Q2_K => (256, 84),
            GgmlType::Q3_K => (256, 110),
            GgmlType::Q4_K => (256, 144),
            GgmlType::Q5_K => (256, 176),
            GgmlType::Q6_K => (256, 210),
            GgmlType::Q8_K => (256, 292),
            GgmlType::I8 => (1, 1),
            GgmlType::I16 => (1, 2),
            GgmlType::I32 => (1, 4),
            GgmlType::I64 => (1, 8),
            GgmlType::F64 => (1, 8),
            GgmlType::BF16 => (1, 2),
        }
    }

    /// Layout family
    pub const fn family(self) -> QuantFamily {
        match self {
            GgmlType::F32 | GgmlType::F16 => QuantFamily::Float,
            GgmlType::Q4_0 | GgmlType::Q4_1 | GgmlType::Q5_0 | GgmlType::Q5_1 | GgmlType::Q8_0 => {
                QuantFamily::Simple
            },
            GgmlType::Q2_K | GgmlType::Q3_K | GgmlType::Q4_K | GgmlType::Q5_K | GgmlType::Q6_K => {
                QuantFamily::KQuant
            },
            _ => QuantFamily::Storage,
        }
    }

    /// Whether this is a lossy block quantization
    pub const fn is_quantized(self) -> bool {
        matches!(
            self,
            GgmlType::Q4_0
                | GgmlType::Q4_1
                | GgmlType::Q5_0
                | GgmlType::Q5_1
                | GgmlType::Q8_0
                | GgmlType::Q8_1
                | GgmlType::Q2_K
                | GgmlType::Q3_K
                | GgmlType::Q4_K
                | GgmlType::Q5_K
                | GgmlType::Q6_K
                | GgmlType::Q8_K
        )
    }

    /// Whether the codec can produce this encoding
    pub const fn is_selectable(self) -> bool {
        !matches!(self.family(), QuantFamily::Storage)
    }

    /// Full descriptor for this encoding
    pub const fn descriptor(self) -> TypeDescriptor {
        let (elements_per_block, bytes_per_block) = self.geometry();
        TypeDescriptor {
            ty: self,
            name: self.name(),
            elements_per_block,
            bytes_per_block,
            is_quantized: self.is_quantized(),
        }
    }
}

impl std::fmt::Display for GgmlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for GgmlType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

// ============================================================================
// File types (the header "declared base type")
// ============================================================================

/// File-level type code stored in the hyperparameter header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum FileType {
    /// Every tensor f32
    AllF32,
    /// Weights f16
    MostlyF16,
    /// Weights `Q4_0`
    MostlyQ4_0,
    /// Weights `Q4_1`
    MostlyQ4_1,
    /// Weights `Q8_0`
    MostlyQ8_0,
    /// Weights `Q5_0`
    MostlyQ5_0,
    /// Weights `Q5_1`
    MostlyQ5_1,
    /// Weights `Q2_K`
    MostlyQ2_K,
    /// Weights `Q3_K`
    MostlyQ3_K,
    /// Weights `Q4_K`
    MostlyQ4_K,
    /// Weights `Q5_K`
    MostlyQ5_K,
    /// Weights `Q6_K`
    MostlyQ6_K,
}

impl FileType {
    /// Every file type, in code order
    pub const ALL: [FileType; 12] = [
        FileType::AllF32,
        FileType::MostlyF16,
        FileType::MostlyQ4_0,
        FileType::MostlyQ4_1,
        FileType::MostlyQ8_0,
        FileType::MostlyQ5_0,
        FileType::MostlyQ5_1,
        FileType::MostlyQ2_K,
        FileType::MostlyQ3_K,
        FileType::MostlyQ4_K,
        FileType::MostlyQ5_K,
        FileType::MostlyQ6_K,
    ];

    /// Numeric code
    pub const fn code(self) -> i32 {
        match self {
            FileType::AllF32 => 0,
            FileType::MostlyF16 => 1,
            FileType::MostlyQ4_0 => 2,
            FileType::MostlyQ4_1 => 3,
            FileType::MostlyQ8_0 => 7,
            FileType::MostlyQ5_0 => 8,
            FileType::MostlyQ5_1 => 9,
            FileType::MostlyQ2_K => 10,
            FileType::MostlyQ3_K => 11,
            FileType::MostlyQ4_K => 12,
            FileType::MostlyQ5_K => 13,
            FileType::MostlyQ6_K => 14,
        }
    }

    /// Look up by numeric code
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|ft| ft.code() == code)
    }

    /// Tensor type used for the file's weight matrices
    pub const fn tensor_type(self) -> GgmlType {
        match self {
            FileType::AllF32 => GgmlType::F32,
            FileType::MostlyF16 => GgmlType::F16,
            FileType::MostlyQ4_0 => GgmlType::Q4_0,
            FileType::MostlyQ4_1 => GgmlType::Q4_1,
            FileType::MostlyQ8_0 => GgmlType::Q8_0,
            FileType::MostlyQ5_0 => GgmlType::Q5_0,
            FileType::MostlyQ5_1 => GgmlType::Q5_1,
            FileType::MostlyQ2_K => GgmlType::Q2_K,
            FileType::MostlyQ3_K => GgmlType::Q3_K,
            FileType::MostlyQ4_K => GgmlType::Q4_K,
            FileType::MostlyQ5_K => GgmlType::Q5_K,
            FileType::MostlyQ6_K => GgmlType::Q6_K,
        }
    }

    /// File type whose weights use `ty`
    pub fn for_tensor_type(ty: GgmlType) -> Option<Self> {
        Self::ALL.iter().copied().find(|ft| ft.tensor_type() == ty)
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Registry of encoding names and geometry for one run
#[derive(Debug, Clone)]
pub struct TypeCatalog {
    entries: Vec<TypeDescriptor>,
}

impl Default for TypeCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeCatalog {
    /// Build the standard catalog
    pub fn new() -> Self {
        Self {
            entries: GgmlType::ALL.iter().map(|ty| ty.descriptor()).collect(),
        }
    }

    /// Resolve a selectable type by case-insensitive name
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` carrying the offending string if no selectable
    /// encoding has that name.
    pub fn resolve(&self, name: &str) -> Result<&TypeDescriptor> {
        let wanted = name.trim().to_ascii_lowercase();
        self.entries
            .iter()
            .find(|d| d.ty.is_selectable() && d.name == wanted)
            .ok_or_else(|| CuantizarError::UnknownType {
                name: name.to_string(),
            })
    }

    /// Descriptor for a numeric id read from a file
    pub fn by_id(&self, id: u32) -> Option<&TypeDescriptor> {
        self.entries.iter().find(|d| d.id() == id)
    }

    /// Descriptor for a known encoding
    pub fn descriptor(&self, ty: GgmlType) -> TypeDescriptor {
        ty.descriptor()
    }

    /// The 16-bit float encoding
    pub fn f16(&self) -> GgmlType {
        GgmlType::F16
    }

    /// Selectable encodings, in id order
    pub fn selectable(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.entries.iter().filter(|d| d.ty.is_selectable())
    }

    /// Resolve the run's default type from a name or a numeric file-type code
    ///
    /// The default must be a quantized encoding: `f32`/`f16` (and the codes
    /// 0 and 1) are rejected.
    ///
    /// # Errors
    ///
    /// `UnknownType` for unrecognised names, `ArgumentError` for unknown codes
    /// or non-quantized defaults.
    pub fn resolve_file_type(&self, text: &str) -> Result<GgmlType> {
        let trimmed = text.trim();
        let ty = if let Ok(code) = trimmed.parse::<i32>() {
            FileType::from_code(code)
                .ok_or_else(|| CuantizarError::argument(text, "unknown file type code"))?
                .tensor_type()
        } else {
            self.resolve(trimmed)?.ty
        };

        if !ty.is_quantized() {
            return Err(CuantizarError::argument(
                text,
                format!("default type must be a quantized type, got {ty}"),
            ));
        }
        Ok(ty)
    }

    /// Help text listing valid default types, one per line
    pub fn file_types(&self) -> String {
        FileType::ALL
            .iter()
            .filter(|ft| ft.tensor_type().is_quantized())
            .map(|ft| format!("  type = \"{}\" or {}", ft.tensor_type().name(), ft.code()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
