//! Byte-level I/O primitives: buffers, random-access readers over memory or
//! multi-part files, and sequential stream readers.

pub mod buffer;
pub mod file_compound;
pub mod reader;
pub mod stream;

pub use buffer::Buffer;
pub use file_compound::{FileCompound, FileReader};
pub use reader::{read_at, read_cstring, BufferReader, Reader};
pub use stream::{RawStreamReader, StreamReader};
