//! icystream — HTTP streaming input for audio players
//!
//! Fetches audio over HTTP on a shared I/O thread and exposes a blocking
//! pull interface to the decoder, together with out-of-band ICY metadata.
//! Transfers pause when the consumer falls behind and resume when it
//! catches up, keeping memory bounded without busy-looping.
//!
//! ## Quick start
//!
//! ```no_run
//! use icystream::{HttpInput, Reactor};
//!
//! # fn main() -> icystream::Result<()> {
//! let reactor = Reactor::new()?;
//! let Some(mut stream) = HttpInput::open(&reactor.handle(), "http://example.com/radio")? else {
//!     return Ok(()); // not an http:// URL
//! };
//!
//! let mut buf = [0u8; 4096];
//! while stream.read(&mut buf)? > 0 {
//!     if let Some(tag) = stream.tag() {
//!         println!("now playing: {:?}", tag.title);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod icy;
pub mod metadata;
pub mod reactor;
pub mod stream;
mod transfer;

pub use config::{LegacyProxySettings, ProxyConfig};
pub use error::{InputError, Result};
pub use metadata::StreamTag;
pub use reactor::{Reactor, ReactorHandle};
pub use stream::HttpInput;
