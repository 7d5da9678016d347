//! Wire protocol - framing on top of a raw byte stream.
//!
//! A frame is a fixed 14-byte header followed by `body_len` bytes. The
//! length prefix is what resolves byte-stream boundary ambiguity: the reader
//! pulls exactly 14 header bytes, then exactly `body_len` body bytes.
//!
//! ```text
//! 0      3  4  5  6         10        14
//! ┌──────┬──┬──┬──┬─────────┬─────────┬───────────────┐
//! │magic │v │ct│mt│   seq   │ body_len│    body ...   │
//! │ mrp  │01│  │  │ u32 BE  │ u32 BE  │ body_len bytes│
//! └──────┴──┴──┴──┴─────────┴─────────┴───────────────┘
//! ```
//!
//! All multi-byte integers are big endian.

mod framer;
mod wire_format;

pub use framer::{read_frame, write_frame, MAX_BODY_LEN};
pub use wire_format::{CodecKind, Header, MsgType, HEADER_SIZE, MAGIC, VERSION};
