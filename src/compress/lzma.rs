//! LZMA (xz) backend built on `xz2`'s `XzDecoder`/`XzEncoder`.

use std::io::{Read, Write};
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

pub(super) fn decoder<R: Read>(upstream: R) -> impl Read {
    XzDecoder::new(upstream)
}

pub(super) fn encoder<W: Write>(writer: W, preset: u32) -> impl Write {
    XzEncoder::new(writer, preset)
}
