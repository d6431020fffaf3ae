//! # easync codec
//!
//! WBXML tag-tree encoding and decoding for the ActiveSync wire format.
//!
//! - [`tags`] is the static tag catalog, one module per code page.
//! - [`Encoder`] writes requests. Elements with no content collapse into a
//!   single byte and page switches are only emitted when the page changes.
//! - [`Decoder`] is a bounds-checked pull cursor over responses. Malformed
//!   input is always a [`CodecError`], never a panic.
//!
//! ## Usage
//!
//! ```
//! use easync_codec::{tags::sync, Decoder, Encoder, Scope, Token};
//!
//! let mut enc = Encoder::new();
//! enc.start(sync::SYNC)?.data(sync::SYNC_KEY, "A1")?.end()?;
//! let bytes = enc.finish()?;
//!
//! let mut dec = Decoder::new(&bytes)?;
//! assert_eq!(dec.next_tag(Scope::Document)?, Token::Tag(sync::SYNC));
//! assert_eq!(dec.next_tag(Scope::Tag(sync::SYNC))?, Token::Tag(sync::SYNC_KEY));
//! assert_eq!(dec.value()?, "A1");
//! # Ok::<(), easync_codec::CodecError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
pub mod tags;
pub mod wire;

pub use decoder::{Decoder, Event, Scope, Token};
pub use encoder::Encoder;
pub use error::{CodecError, CodecResult};
pub use tags::TagToken;
