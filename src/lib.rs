//! A pure-Rust library for reading and writing ZIM archives.
//!
//! ZIM is the file format used to store offline copies of wikis and other
//! web content (Wikipedia, Wiktionary, Stack Exchange dumps, and others) as
//! a single compressed, randomly-accessible file. See the
//! [OpenZIM project](https://wiki.openzim.org/) for the format reference.
//!
//! The reader side is [`archive::Archive`]; the writer side is
//! [`writer::Creator`].

mod endian;
mod error;

pub mod archive;
pub mod cache;
pub mod cluster;
pub mod compress;
pub mod dirent;
pub mod io;
pub mod mime;
pub mod namespace;
pub mod search;
pub mod writer;

pub use archive::{Archive, Blob, Entry};
pub use compress::{CompressionCode, Level};
pub use dirent::{Dirent, Target};
pub use error::{Error, Result};
pub use namespace::Namespace;
pub use writer::{BytesItem, Config, Creator, Item};
