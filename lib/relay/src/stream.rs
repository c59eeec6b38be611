//! Typed accessors for the wire format. All multi-byte integers are
//! little-endian; strings carry a `u32` length prefix followed by UTF-8
//! bytes; booleans are a single byte.

use crate::support::{ErrorType, NetworkError, NetworkResult};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io;

pub use byteorder::LittleEndian as Wire;

/// Longest string accepted off the wire. The protocol only ships endpoint
/// advertisements, so anything bigger is garbage.
const MAX_STR_LEN: usize = 512;

#[inline]
pub fn write_str<W: io::Write>(writer: &mut W, value: &str) -> io::Result<()> {
    writer.write_u32::<Wire>(value.len() as u32)?;
    writer.write_all(value.as_bytes())
}

pub fn read_str<R: io::Read>(reader: &mut R) -> NetworkResult<String> {
    let len = reader.read_u32::<Wire>()? as usize;

    if len > MAX_STR_LEN {
        return Err(NetworkError::Fatal(ErrorType::Malformed));
    }

    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;

    String::from_utf8(bytes).map_err(|_| NetworkError::Fatal(ErrorType::Malformed))
}

#[inline]
pub fn write_bool<W: io::Write>(writer: &mut W, value: bool) -> io::Result<()> {
    writer.write_u8(value as u8)
}

#[inline]
pub fn read_bool<R: io::Read>(reader: &mut R) -> NetworkResult<bool> {
    Ok(reader.read_u8()? != 0)
}
