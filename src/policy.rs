//! Type-aware byte sizes and the header fallback type
//!
//! Every payload size in the crate goes through [`BufferSizePolicy`], which
//! derives it from the declared type's block geometry. Nothing assumes a
//! fixed per-element width.
//!
//! The loader-side helpers ([`BufferSizePolicy::ensure_fits`] and
//! [`BufferSizePolicy::strides`]) mirror what a consumer of the written file
//! does when a tensor's declared type differs from the header type.

use crate::catalog::{GgmlType, TypeCatalog};
use crate::error::{CuantizarError, Result};

/// Size computations bound to one run's catalog
#[derive(Debug, Clone, Copy)]
pub struct BufferSizePolicy<'a> {
    catalog: &'a TypeCatalog,
}

impl<'a> BufferSizePolicy<'a> {
    /// Policy over `catalog`
    pub fn new(catalog: &'a TypeCatalog) -> Self {
        Self { catalog }
    }

    /// Catalog this policy sizes against
    pub fn catalog(&self) -> &'a TypeCatalog {
        self.catalog
    }

    /// Bytes for one row: `ceil(row_extent / elements_per_block) * bytes_per_block`
    pub fn row_byte_size(&self, ty: GgmlType, row_extent: usize) -> usize {
        let d = self.catalog.descriptor(ty);
        row_extent.div_ceil(d.elements_per_block) * d.bytes_per_block
    }

    /// Bytes for a whole tensor: row size times the product of the other extents
    ///
    /// # Errors
    ///
    /// `FormatError` if the size does not fit in `usize`.
    pub fn tensor_byte_size(&self, ty: GgmlType, extents: &[usize]) -> Result<usize> {
        let Some((&row, rest)) = extents.split_first() else {
            return Ok(0);
        };
        rest.iter()
            .try_fold(self.row_byte_size(ty, row), |acc, &e| acc.checked_mul(e))
            .ok_or_else(|| {
                CuantizarError::format(format!("tensor size overflows for extents {extents:?} ({ty})"))
            })
    }

    /// Type recorded in the file header
    ///
    /// With no rules the requested default is used. With any rule the header
    /// says f16, whose per-element footprint bounds every quantized type, so a
    /// loader sizing buffers from the header never under-allocates.
    pub fn header_fallback_type(&self, rule_count: usize, requested: GgmlType) -> GgmlType {
        if rule_count == 0 {
            requested
        } else {
            self.catalog.f16()
        }
    }

    /// Check a declared tensor against a buffer sized for `allocated_for`
    ///
    /// # Errors
    ///
    /// `BufferTooSmall` when the declared size exceeds the allocation.
    pub fn ensure_fits(
        &self,
        tensor: &str,
        declared: GgmlType,
        extents: &[usize],
        allocated_for: GgmlType,
    ) -> Result<()> {
        let required = self.tensor_byte_size(declared, extents)?;
        let allocated = self.tensor_byte_size(allocated_for, extents)?;
        if required > allocated {
            return Err(CuantizarError::BufferTooSmall {
                tensor: tensor.to_string(),
                required,
                allocated,
            });
        }
        Ok(())
    }

    /// Byte strides for a tensor of `declared` type, extents padded to rank 4
    ///
    /// # Errors
    ///
    /// `FormatError` if a stride does not fit in `usize`.
    pub fn strides(&self, declared: GgmlType, extents: &[usize]) -> Result<[usize; 4]> {
        let d = self.catalog.descriptor(declared);
        let mut ne = [1usize; 4];
        for (slot, &e) in ne.iter_mut().zip(extents) {
            *slot = e;
        }
        let overflow =
            || CuantizarError::format(format!("tensor strides overflow for extents {extents:?} ({declared})"));

        let mut nb = [0usize; 4];
        nb[0] = d.bytes_per_block;
        nb[1] = nb[0].checked_mul(ne[0] / d.elements_per_block).ok_or_else(overflow)?;
        for i in 2..4 {
            nb[i] = nb[i - 1].checked_mul(ne[i - 1]).ok_or_else(overflow)?;
        }
        Ok(nb)
    }
}
