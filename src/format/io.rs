//! Primitive little-endian readers and writers over `Read`/`Write`
//!
//! A short read is always a `FormatError` (the file is truncated); any other
//! failure is an `IoError` tagged with what was being read or written.

use std::io::{self, ErrorKind, Read, Write};

use crate::error::{CuantizarError, Result};

fn read_failure(what: &str, e: io::Error) -> CuantizarError {
    if e.kind() == ErrorKind::UnexpectedEof {
        CuantizarError::format(format!("truncated file while reading {what}"))
    } else {
        CuantizarError::io(format!("read {what}"), e)
    }
}

/// Fill `buf` completely
pub(crate) fn read_bytes<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| read_failure(what, e))
}

/// Read a u32 (little-endian)
pub(crate) fn read_u32<R: Read>(reader: &mut R, what: &str) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_bytes(reader, &mut buf, what)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read an i32 (little-endian)
pub(crate) fn read_i32<R: Read>(reader: &mut R, what: &str) -> Result<i32> {
    let mut buf = [0u8; 4];
    read_bytes(reader, &mut buf, what)?;
    Ok(i32::from_le_bytes(buf))
}

/// Read an i32, or `None` if the stream ends before its first byte
///
/// Ending after one to three bytes is a truncation.
pub(crate) fn read_i32_or_eof<R: Read>(reader: &mut R, what: &str) -> Result<Option<i32>> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_failure(what, e)),
        }
    }
    match filled {
        0 => Ok(None),
        4 => Ok(Some(i32::from_le_bytes(buf))),
        n => Err(CuantizarError::format(format!(
            "truncated file while reading {what} ({n} of 4 bytes)"
        ))),
    }
}

/// Write raw bytes
pub(crate) fn write_bytes<W: Write>(writer: &mut W, bytes: &[u8], what: &str) -> Result<()> {
    writer
        .write_all(bytes)
        .map_err(|e| CuantizarError::io(format!("write {what}"), e))
}

/// Write a u32 (little-endian)
pub(crate) fn write_u32<W: Write>(writer: &mut W, value: u32, what: &str) -> Result<()> {
    write_bytes(writer, &value.to_le_bytes(), what)
}

/// Write an i32 (little-endian)
pub(crate) fn write_i32<W: Write>(writer: &mut W, value: i32, what: &str) -> Result<()> {
    write_bytes(writer, &value.to_le_bytes(), what)
}

/// Copy exactly `len` bytes from `reader` to `writer`
pub(crate) fn copy_exact<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    len: u64,
    what: &str,
) -> Result<()> {
    let copied = io::copy(&mut reader.by_ref().take(len), writer)
        .map_err(|e| CuantizarError::io(format!("copy {what}"), e))?;
    if copied != len {
        return Err(CuantizarError::format(format!(
            "truncated file while reading {what}: expected {len} bytes, got {copied}"
        )));
    }
    Ok(())
}
