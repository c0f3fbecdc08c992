//! Streaming packet parser.
//!
//! [`Parser`] consumes an append-only byte stream across arbitrarily
//! fragmented buffers and yields routing modifiers, entity modifiers, a
//! method and a body without buffering anything itself. All slices in the
//! returned [`Event`]s alias the buffer passed to the most recent
//! [`Parser::feed`]; they are superseded when the next buffer is installed.
//!
//! The parser suspends cooperatively: when the current buffer ends in the
//! middle of a production, [`Parser::step`] returns
//! [`Event::Insufficient`], the cursor rewinds to the start of that
//! production and [`Parser::remaining_slice`] is the tail the caller has to
//! carry over into the next buffer:
//!
//! ```
//! use psyc_rs::{Event, Oper, Parser};
//!
//! let mut parser = Parser::new().feed(b":_source\tab");
//! assert_eq!(parser.step(), Ok(Event::Insufficient));
//!
//! // carry the tail over into the next read
//! let mut carry = parser.remaining_slice().to_vec();
//! carry.extend_from_slice(b"c\n|\n");
//! let mut parser = parser.feed(&carry);
//! assert_eq!(
//!     parser.step(),
//!     Ok(Event::Routing { oper: Oper::Set, name: b"_source", value: b"abc" })
//! );
//! assert_eq!(parser.step(), Ok(Event::Complete));
//! ```
//!
//! The exception to the carry-over rule are values with an explicit length
//! prefix: once the length is known, the value is delivered chunk by chunk
//! (`…Start` / `…Cont` / `…End` events) and only the unconsumed rest of
//! the buffer has to be carried over, so replayed bytes stay minimal.

use crate::packet::{find_delimiter, is_glyph, is_kw_char, Oper};

pub mod list;

/// Error type used by the parser.
///
/// Errors are terminal for the current packet only; the parser may be
/// re-initialized and reused.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParseError {
    /// The packet does not end with a valid delimiter.
    InvalidEnd,
    /// Expected LF after the method.
    InvalidMethod,
    /// Expected LF after a modifier value.
    InvalidModifierLine,
    /// Modifier length is not numeric.
    InvalidModifierLength,
    /// Expected TAB before a modifier value.
    InvalidModifierTab,
    /// Modifier name is missing.
    InvalidModifierName,
    /// Expected LF after the content length.
    InvalidContentLength,
}

impl ParseError {
    fn describe(&self) -> &'static str {
        match self {
            ParseError::InvalidEnd => "packet does not end with a valid delimiter",
            ParseError::InvalidMethod => "expected newline after the method",
            ParseError::InvalidModifierLine => "expected newline after a modifier value",
            ParseError::InvalidModifierLength => "modifier length is not numeric",
            ParseError::InvalidModifierTab => "expected tab before a modifier value",
            ParseError::InvalidModifierName => "modifier name is missing",
            ParseError::InvalidContentLength => "expected newline after the content length",
        }
    }
}

impl core::fmt::Display for ParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.describe())
    }
}

#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
impl std::error::Error for ParseError {}

/// What part of each packet the parser processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Parse the routing header and the structured content.
    Full,
    /// Parse the routing header only; the content is yielded as an opaque
    /// block via the `Content…` events.
    RoutingOnly,
    /// Each buffer holds one complete content without a routing header or
    /// packet delimiter.
    ContentOnly,
}

/// Progress reported by [`Parser::step`].
///
/// The `…Start` / `…Cont` / `…End` triples are used exclusively for
/// length-prefixed values that exceed what the current buffer holds; a
/// value that is fully available is always reported as a single event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<'i> {
    /// More input is needed. Prepend [`Parser::remaining_slice`] to the
    /// next buffer and feed it.
    Insufficient,
    /// A routing modifier line.
    Routing {
        /// Operator of the modifier.
        oper: Oper,
        /// Variable name.
        name: &'i [u8],
        /// Complete value.
        value: &'i [u8],
    },
    /// An entity modifier line, parsed in one go.
    Entity {
        /// Operator of the modifier.
        oper: Oper,
        /// Variable name.
        name: &'i [u8],
        /// Complete value.
        value: &'i [u8],
    },
    /// Start of a length-prefixed entity value spanning buffers; operator
    /// and name are complete, the value is the first chunk.
    EntityStart {
        /// Operator of the modifier.
        oper: Oper,
        /// Variable name.
        name: &'i [u8],
        /// First chunk of the value.
        value: &'i [u8],
    },
    /// Next chunk of an entity value.
    EntityCont {
        /// Value chunk.
        value: &'i [u8],
    },
    /// Last chunk of an entity value.
    EntityEnd {
        /// Final value chunk, possibly empty.
        value: &'i [u8],
    },
    /// Method and data, parsed in one go.
    Body {
        /// Method naming the message kind.
        method: &'i [u8],
        /// Complete data block.
        data: &'i [u8],
    },
    /// Start of a body whose data spans buffers.
    BodyStart {
        /// Method naming the message kind.
        method: &'i [u8],
        /// First chunk of the data.
        data: &'i [u8],
    },
    /// Next chunk of the body data.
    BodyCont {
        /// Data chunk.
        data: &'i [u8],
    },
    /// Last chunk of the body data.
    BodyEnd {
        /// Final data chunk, possibly empty.
        data: &'i [u8],
    },
    /// The whole content as one opaque block ([`Mode::RoutingOnly`]).
    Content {
        /// Content bytes, including the trailing LF.
        value: &'i [u8],
    },
    /// Start of a content block spanning buffers ([`Mode::RoutingOnly`]).
    ContentStart {
        /// First chunk of the content.
        value: &'i [u8],
    },
    /// Next chunk of the content block.
    ContentCont {
        /// Content chunk.
        value: &'i [u8],
    },
    /// Last chunk of the content block.
    ContentEnd {
        /// Final content chunk, possibly empty.
        value: &'i [u8],
    },
    /// The packet is finished; the parser is reset for the next one.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Routing,
    Length,
    Content,
    /// Inside a length-prefixed entity value.
    EntityValue,
    /// Inside a length-bounded data block.
    Data,
    /// Inside an opaque content block.
    RawContent,
    End,
}

/// Resumable packet parser.
///
/// See the [module documentation](self) for the feeding protocol.
#[derive(Debug)]
pub struct Parser<'buf> {
    buffer: &'buf [u8],
    cursor: usize,
    resume: usize,
    mode: Mode,
    part: Part,
    routing_length: usize,
    content_parsed: usize,
    content_length: usize,
    content_length_known: bool,
    value_parsed: usize,
    value_length: usize,
    value_length_known: bool,
}

impl Parser<'static> {
    /// Creates a parser for whole packets.
    pub fn new() -> Self {
        Self::with_mode(Mode::Full)
    }

    /// Creates a parser with the given [`Mode`].
    pub fn with_mode(mode: Mode) -> Self {
        Parser {
            buffer: &[],
            cursor: 0,
            resume: 0,
            mode,
            part: match mode {
                Mode::ContentOnly => Part::Content,
                _ => Part::Routing,
            },
            routing_length: 0,
            content_parsed: 0,
            content_length: 0,
            content_length_known: false,
            value_parsed: 0,
            value_length: 0,
            value_length_known: false,
        }
    }
}

impl Default for Parser<'static> {
    fn default() -> Self {
        Parser::new()
    }
}

impl<'buf> Parser<'buf> {
    /// Installs the next input buffer and resets the cursor.
    ///
    /// Consuming the parser rebinds the buffer lifetime, so state carries
    /// over between buffers while each event still borrows from the buffer
    /// it was parsed out of. In [`Mode::ContentOnly`] the buffer is taken
    /// to be one complete content and its length becomes the known content
    /// length.
    pub fn feed(self, buffer: &[u8]) -> Parser<'_> {
        let mut p = Parser {
            buffer,
            cursor: 0,
            resume: 0,
            mode: self.mode,
            part: self.part,
            routing_length: self.routing_length,
            content_parsed: self.content_parsed,
            content_length: self.content_length,
            content_length_known: self.content_length_known,
            value_parsed: self.value_parsed,
            value_length: self.value_length,
            value_length_known: self.value_length_known,
        };
        if p.mode == Mode::ContentOnly {
            p.part = Part::Content;
            p.content_length = buffer.len();
            p.content_length_known = true;
            p.content_parsed = 0;
        }
        p
    }

    /// Current position in the buffer.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The unconsumed rest of the buffer, from the last resume point.
    pub fn remaining_slice(&self) -> &'buf [u8] {
        &self.buffer[self.cursor..]
    }

    /// Length of [`Parser::remaining_slice`].
    pub fn remaining_len(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// Serialized length of the routing header parsed so far.
    pub fn routing_length(&self) -> usize {
        self.routing_length
    }

    /// Expected length of the content part of the current packet.
    pub fn content_length(&self) -> usize {
        self.content_length
    }

    /// Whether the current packet declared its content length.
    pub fn content_length_known(&self) -> bool {
        self.content_length_known
    }

    /// Declared length of the current (or last) length-prefixed value.
    pub fn value_length(&self) -> usize {
        self.value_length
    }

    /// Whether the current (or last) value carried a length prefix.
    ///
    /// Lets callers that re-render a parsed packet keep its framing.
    pub fn value_length_known(&self) -> bool {
        self.value_length_known
    }

    /// Advances the parse by one event.
    ///
    /// Errors are terminal for the current packet; [`Event::Insufficient`]
    /// rewinds the cursor to the start of the unfinished production.
    pub fn step(&mut self) -> Result<Event<'buf>, ParseError> {
        match self.run() {
            Ok(Some(event)) => Ok(event),
            Ok(None) => {
                self.cursor = self.resume;
                Ok(Event::Insufficient)
            }
            Err(e) => Err(e),
        }
    }

    fn byte_at(&self, i: usize) -> Option<u8> {
        self.buffer.get(i).copied()
    }

    fn run(&mut self) -> Result<Option<Event<'buf>>, ParseError> {
        // a `need!`-style helper is not possible across `?`, so missing
        // bytes surface as Ok(None) from every production
        loop {
            match self.part {
                Part::Routing => {
                    self.resume = self.cursor;
                    let b = match self.byte_at(self.cursor) {
                        Some(b) => b,
                        None => return Ok(None),
                    };
                    if is_glyph(b) {
                        return self.modifier_line();
                    } else if b == b'|' {
                        self.part = Part::End;
                    } else {
                        self.part = Part::Length;
                    }
                }
                Part::Length => {
                    self.resume = self.cursor;
                    let mut i = self.cursor;
                    let first = match self.byte_at(i) {
                        Some(b) => b,
                        None => return Ok(None),
                    };
                    if first.is_ascii_digit() {
                        let mut len: usize = 0;
                        while let Some(b) = self.byte_at(i) {
                            if !b.is_ascii_digit() {
                                break;
                            }
                            len = len
                                .checked_mul(10)
                                .and_then(|l| l.checked_add((b - b'0') as usize))
                                .ok_or(ParseError::InvalidContentLength)?;
                            i += 1;
                        }
                        if i >= self.buffer.len() {
                            return Ok(None);
                        }
                        self.content_length = len;
                        self.content_length_known = true;
                    }
                    if self.byte_at(i) != Some(b'\n') {
                        return Err(ParseError::InvalidContentLength);
                    }
                    self.cursor = i + 1;
                    self.content_parsed = 0;
                    self.part = Part::Content;
                }
                Part::Content => {
                    self.resume = self.cursor;
                    if self.mode == Mode::ContentOnly
                        && self.content_length_known
                        && self.content_parsed >= self.content_length
                    {
                        self.reset_packet();
                        return Ok(Some(Event::Complete));
                    }
                    if self.mode == Mode::RoutingOnly {
                        return self.raw_content();
                    }
                    let b = match self.byte_at(self.cursor) {
                        Some(b) => b,
                        None => return Ok(None),
                    };
                    if is_glyph(b) {
                        return self.modifier_line();
                    } else if b == b'|' {
                        self.part = Part::End;
                    } else {
                        return self.body();
                    }
                }
                Part::EntityValue => {
                    self.resume = self.cursor;
                    return self.entity_value_cont();
                }
                Part::Data => {
                    self.resume = self.cursor;
                    return self.data_cont();
                }
                Part::RawContent => {
                    self.resume = self.cursor;
                    return self.raw_content_cont();
                }
                Part::End => {
                    if self.mode == Mode::ContentOnly {
                        self.reset_packet();
                        return Ok(Some(Event::Complete));
                    }
                    self.resume = self.cursor;
                    let b0 = match self.byte_at(self.cursor) {
                        Some(b) => b,
                        None => return Ok(None),
                    };
                    let b1 = match self.byte_at(self.cursor + 1) {
                        Some(b) => b,
                        None => return Ok(None),
                    };
                    if b0 != b'|' || b1 != b'\n' {
                        return Err(ParseError::InvalidEnd);
                    }
                    self.cursor += 2;
                    self.reset_packet();
                    return Ok(Some(Event::Complete));
                }
            }
        }
    }

    fn reset_packet(&mut self) {
        self.part = match self.mode {
            Mode::ContentOnly => Part::Content,
            _ => Part::Routing,
        };
        self.resume = self.cursor;
        self.routing_length = 0;
        self.content_parsed = 0;
        self.content_length = 0;
        self.content_length_known = false;
        self.value_parsed = 0;
        self.value_length = 0;
        self.value_length_known = false;
    }

    /// Parses one `oper name [SP length] TAB value LF` line. The cursor is
    /// at the operator glyph and is only moved once the line (or its
    /// streamed head) is accepted.
    fn modifier_line(&mut self) -> Result<Option<Event<'buf>>, ParseError> {
        let start = self.cursor;
        let oper = match Oper::from_byte(self.buffer[start]) {
            Some(oper) => oper,
            None => return Err(ParseError::InvalidModifierName),
        };

        let name_start = start + 1;
        let mut i = name_start;
        while let Some(b) = self.byte_at(i) {
            if !is_kw_char(b) {
                break;
            }
            i += 1;
        }
        if i >= self.buffer.len() {
            return Ok(None); // the name may continue in the next buffer
        }
        if i == name_start {
            return Err(ParseError::InvalidModifierName);
        }
        let name = &self.buffer[name_start..i];

        match self.buffer[i] {
            b'\n' => {
                // bare modifier without a value
                self.cursor = i + 1;
                self.value_parsed = 0;
                self.value_length = 0;
                self.value_length_known = false;
                Ok(Some(self.emit_modifier(oper, name, &[], start)))
            }
            b'\t' => {
                let vstart = i + 1;
                let nl = match self.buffer[vstart..].iter().position(|&b| b == b'\n') {
                    Some(nl) => nl,
                    None => return Ok(None),
                };
                let value = &self.buffer[vstart..vstart + nl];
                self.cursor = vstart + nl + 1;
                self.value_parsed = value.len();
                self.value_length = 0;
                self.value_length_known = false;
                Ok(Some(self.emit_modifier(oper, name, value, start)))
            }
            b' ' => {
                // a length prefix marks the start of the entity section;
                // routing modifiers are always short form
                if self.part == Part::Routing {
                    self.part = Part::Content;
                    if self.mode == Mode::RoutingOnly {
                        // the line belongs to the opaque content
                        return self.raw_content();
                    }
                }

                let mut j = i + 1;
                match self.byte_at(j) {
                    Some(b) if b.is_ascii_digit() => {}
                    Some(_) => return Err(ParseError::InvalidModifierLength),
                    None => return Ok(None),
                }
                let mut len: usize = 0;
                while let Some(b) = self.byte_at(j) {
                    if !b.is_ascii_digit() {
                        break;
                    }
                    len = len
                        .checked_mul(10)
                        .and_then(|l| l.checked_add((b - b'0') as usize))
                        .ok_or(ParseError::InvalidModifierLength)?;
                    j += 1;
                }
                if j >= self.buffer.len() {
                    return Ok(None);
                }
                if self.buffer[j] != b'\t' {
                    return Err(ParseError::InvalidModifierTab);
                }

                let vstart = j + 1;
                self.value_length = len;
                self.value_length_known = true;
                let avail = self.buffer.len() - vstart;
                if avail > len {
                    // the whole value and its newline are here
                    let value = &self.buffer[vstart..vstart + len];
                    if self.buffer[vstart + len] != b'\n' {
                        return Err(ParseError::InvalidModifierLine);
                    }
                    self.cursor = vstart + len + 1;
                    self.value_parsed = len;
                    return Ok(Some(self.emit_modifier(oper, name, value, start)));
                }

                // the value spans buffers: stream it chunk by chunk
                let value = &self.buffer[vstart..];
                self.cursor = self.buffer.len();
                self.value_parsed = value.len();
                self.content_parsed += self.cursor - start;
                self.part = Part::EntityValue;
                Ok(Some(Event::EntityStart { oper, name, value }))
            }
            _ => Err(ParseError::InvalidModifierTab),
        }
    }

    fn emit_modifier(&mut self, oper: Oper, name: &'buf [u8], value: &'buf [u8], start: usize) -> Event<'buf> {
        match self.part {
            Part::Routing => {
                self.routing_length += self.cursor - start;
                Event::Routing { oper, name, value }
            }
            _ => {
                self.content_parsed += self.cursor - start;
                Event::Entity { oper, name, value }
            }
        }
    }

    fn entity_value_cont(&mut self) -> Result<Option<Event<'buf>>, ParseError> {
        let remaining = self.value_length - self.value_parsed;
        let avail = self.buffer.len() - self.cursor;

        if remaining == 0 {
            // only the line-terminating newline is outstanding
            match self.byte_at(self.cursor) {
                Some(b'\n') => {}
                Some(_) => return Err(ParseError::InvalidModifierLine),
                None => return Ok(None),
            }
            self.cursor += 1;
            self.content_parsed += 1;
            self.part = Part::Content;
            return Ok(Some(Event::EntityEnd { value: &[] }));
        }

        if avail > remaining {
            let value = &self.buffer[self.cursor..self.cursor + remaining];
            if self.buffer[self.cursor + remaining] != b'\n' {
                return Err(ParseError::InvalidModifierLine);
            }
            self.cursor += remaining + 1;
            self.value_parsed = self.value_length;
            self.content_parsed += remaining + 1;
            self.part = Part::Content;
            return Ok(Some(Event::EntityEnd { value }));
        }

        if avail == 0 {
            return Ok(None);
        }
        let value = &self.buffer[self.cursor..];
        self.cursor = self.buffer.len();
        self.value_parsed += value.len();
        self.content_parsed += value.len();
        Ok(Some(Event::EntityCont { value }))
    }

    /// Parses the method line and the data block following it.
    fn body(&mut self) -> Result<Option<Event<'buf>>, ParseError> {
        let mut i = self.cursor;
        while let Some(b) = self.byte_at(i) {
            if !is_kw_char(b) {
                break;
            }
            i += 1;
        }
        if i >= self.buffer.len() {
            return Ok(None);
        }
        if i == self.cursor || self.buffer[i] != b'\n' {
            return Err(ParseError::InvalidMethod);
        }
        let method = &self.buffer[self.cursor..i];
        let after_method = i + 1;

        if self.content_length_known {
            let parsed = self.content_parsed + method.len() + 1;
            // whatever the declared length leaves over is the data block
            // and its trailing newline
            let remaining = self.content_length.saturating_sub(parsed);
            if remaining == 0 {
                self.cursor = after_method;
                self.content_parsed = parsed;
                self.value_parsed = 0;
                self.value_length = 0;
                self.value_length_known = false;
                self.part = Part::End;
                return Ok(Some(Event::Body { method, data: &[] }));
            }
            let data_len = remaining - 1;
            let avail = self.buffer.len() - after_method;
            if avail >= remaining {
                let data = &self.buffer[after_method..after_method + data_len];
                if self.buffer[after_method + data_len] != b'\n' {
                    return Err(ParseError::InvalidEnd);
                }
                self.cursor = after_method + remaining;
                self.content_parsed = parsed + remaining;
                self.part = Part::End;
                return Ok(Some(Event::Body { method, data }));
            }

            // the data spans buffers: stream it chunk by chunk
            let data = &self.buffer[after_method..after_method + avail.min(data_len)];
            self.cursor = after_method + data.len();
            self.content_parsed = parsed + data.len();
            self.value_parsed = data.len();
            self.value_length = data_len;
            self.value_length_known = true;
            self.part = Part::Data;
            return Ok(Some(Event::BodyStart { method, data }));
        }

        // without a declared length the data runs to the packet delimiter;
        // the newline ending the method doubles as its first byte when the
        // data is empty
        let scan_from = after_method - 1;
        match find_delimiter(&self.buffer[scan_from..]) {
            Some(pos) => {
                let delim = scan_from + pos;
                let data = &self.buffer[after_method.min(delim)..delim];
                self.cursor = delim + 1;
                self.value_parsed = data.len();
                self.value_length = 0;
                self.value_length_known = false;
                self.part = Part::End;
                Ok(Some(Event::Body { method, data }))
            }
            None => Ok(None),
        }
    }

    fn data_cont(&mut self) -> Result<Option<Event<'buf>>, ParseError> {
        let remaining = self.value_length - self.value_parsed;
        let avail = self.buffer.len() - self.cursor;

        if remaining == 0 {
            match self.byte_at(self.cursor) {
                Some(b'\n') => {}
                Some(_) => return Err(ParseError::InvalidEnd),
                None => return Ok(None),
            }
            self.cursor += 1;
            self.content_parsed += 1;
            self.part = Part::End;
            return Ok(Some(Event::BodyEnd { data: &[] }));
        }

        if avail > remaining {
            let data = &self.buffer[self.cursor..self.cursor + remaining];
            if self.buffer[self.cursor + remaining] != b'\n' {
                return Err(ParseError::InvalidEnd);
            }
            self.cursor += remaining + 1;
            self.value_parsed = self.value_length;
            self.content_parsed += remaining + 1;
            self.part = Part::End;
            return Ok(Some(Event::BodyEnd { data }));
        }

        if avail == 0 {
            return Ok(None);
        }
        let data = &self.buffer[self.cursor..];
        self.cursor = self.buffer.len();
        self.value_parsed += data.len();
        self.content_parsed += data.len();
        Ok(Some(Event::BodyCont { data }))
    }

    /// Opaque content handling for [`Mode::RoutingOnly`].
    fn raw_content(&mut self) -> Result<Option<Event<'buf>>, ParseError> {
        if self.content_length_known {
            let remaining = self.content_length - self.content_parsed;
            let avail = self.buffer.len() - self.cursor;
            if avail >= remaining {
                let value = &self.buffer[self.cursor..self.cursor + remaining];
                self.cursor += remaining;
                self.content_parsed = self.content_length;
                self.part = Part::End;
                return Ok(Some(Event::Content { value }));
            }
            if avail == 0 {
                return Ok(None);
            }
            let value = &self.buffer[self.cursor..];
            self.cursor = self.buffer.len();
            self.content_parsed += value.len();
            self.part = Part::RawContent;
            return Ok(Some(Event::ContentStart { value }));
        }

        // without a declared length the content reaches through the
        // newline right before the closing "|"
        match find_delimiter(&self.buffer[self.cursor..]) {
            Some(pos) => {
                let end = self.cursor + pos + 1;
                let value = &self.buffer[self.cursor..end];
                self.cursor = end;
                self.part = Part::End;
                Ok(Some(Event::Content { value }))
            }
            None => Ok(None),
        }
    }

    fn raw_content_cont(&mut self) -> Result<Option<Event<'buf>>, ParseError> {
        let remaining = self.content_length - self.content_parsed;
        let avail = self.buffer.len() - self.cursor;

        if avail >= remaining {
            let value = &self.buffer[self.cursor..self.cursor + remaining];
            self.cursor += remaining;
            self.content_parsed = self.content_length;
            self.part = Part::End;
            return Ok(Some(Event::ContentEnd { value }));
        }
        if avail == 0 {
            return Ok(None);
        }
        let value = &self.buffer[self.cursor..];
        self.cursor = self.buffer.len();
        self.content_parsed += value.len();
        Ok(Some(Event::ContentCont { value }))
    }
}
