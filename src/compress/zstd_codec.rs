//! Zstd backend, grounded on `zimba`'s `zstd::Decoder`/`zstd::Encoder` usage.

use crate::error::Result;
use std::io::{Read, Write};

pub(super) fn decoder<'a, R: Read + 'a>(upstream: R) -> Result<impl Read + 'a> {
    Ok(zstd::stream::read::Decoder::new(upstream)?)
}

pub(super) fn encoder<'a, W: Write + 'a>(writer: W, level: i32) -> Result<impl Write + 'a> {
    Ok(zstd::stream::write::Encoder::new(writer, level)?.auto_finish())
}
