//! `psyc-rs` parses and renders packets of the PSYC wire format, a
//! line-oriented text protocol with optional length-prefixed binary values.
//!
//! A packet consists of a routing header (modifier lines), an optional
//! decimal content length, the content (entity modifier lines, a method
//! line and a data block) and the closing `"|\n"` line:
//!
//! ```text
//! :_source<TAB>psyc://example.org/~alice<LF>
//! <LF>
//! _notice_test<LF>
//! Hi there<LF>
//! |<LF>
//! ```
//!
//! Each modifier line is `oper name [SP length] TAB value LF` where `oper`
//! is one of `: = + - ? ! @`. Values (and whole contents) that could be
//! mistaken for the packet delimiter carry a decimal length prefix and are
//! read verbatim for exactly that many bytes.
//!
//! # Parsing
//!
//! [`Parser`] is a resumable state machine. It is fed caller-owned buffers
//! and steps through them, returning [`Event`]s whose slices alias the
//! current buffer; the parser itself never allocates. When a buffer ends
//! mid-production, [`Parser::step`] returns [`Event::Insufficient`] and
//! [`Parser::remaining_slice`] is the tail that has to be prepended to the
//! next buffer.
//!
//! ```
//! use psyc_rs::{Event, Oper, Parser};
//!
//! let bytes = b":_source\tpsyc://example.org/~alice\n\n_notice_test\nHi there\n|\n";
//! let mut parser = Parser::new().feed(bytes);
//!
//! assert_eq!(
//!     parser.step(),
//!     Ok(Event::Routing {
//!         oper: Oper::Set,
//!         name: b"_source",
//!         value: b"psyc://example.org/~alice",
//!     })
//! );
//! assert_eq!(
//!     parser.step(),
//!     Ok(Event::Body {
//!         method: b"_notice_test",
//!         data: b"Hi there",
//!     })
//! );
//! assert_eq!(parser.step(), Ok(Event::Complete));
//! ```
//!
//! # Rendering
//!
//! [`Packet`] collects borrowed modifier and payload slices, decides the
//! framing ([`PacketFlag`]) and computes the exact serialized lengths;
//! [`render`] then emits the bytes into any [`util::Buffer`]
//! implementation.
//!
//! ```
//! # #[cfg(feature = "alloc")] {
//! use psyc_rs::{render, Modifier, Oper, Packet, PacketFlag};
//! use psyc_rs::util::VecBuf;
//!
//! let routing = [Modifier::routing(Oper::Set, b"_source", b"psyc://example.org/~alice")];
//! let packet = Packet::new(&routing, &[], b"_notice_test", b"Hi there", PacketFlag::Check);
//! let out: VecBuf = render(&packet).unwrap();
//!
//! assert_eq!(
//!     &out[..],
//!     b":_source\tpsyc://example.org/~alice\n\n_notice_test\nHi there\n|\n"
//! );
//! # }
//! ```

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature = "alloc")]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod num;
pub mod packet;
pub mod parser;
pub mod render;
pub mod util;

pub use packet::{List, ListFlag, Modifier, ModifierFlag, Oper, Packet, PacketFlag};
pub use parser::list::{ListEvent, ListError, ListKind, ListParser};
pub use parser::{Event, Mode, ParseError, Parser};
pub use render::{render, render_list, render_modifier, RenderError};
