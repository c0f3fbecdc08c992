//! Packet and list data structures plus the framing rules.
//!
//! Everything here borrows from caller-owned memory; building a [`Packet`]
//! resolves its framing flag and computes the exact serialized lengths so
//! that [`crate::render`] can emit it byte for byte.

use crate::num::num_digits;

/// Modifier values longer than this get a length prefix on their line.
pub const MODIFIER_SIZE_THRESHOLD: usize = 404;

/// Contents longer than this make the whole packet length-prefixed.
pub const CONTENT_SIZE_THRESHOLD: usize = 444;

/// The byte sequence closing a packet at the outermost level.
pub const PACKET_DELIMITER: &[u8] = b"\n|\n";

/// Operator byte introducing a modifier line.
///
/// The parser only classifies the byte; what the operation means for the
/// named variable is up to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Oper {
    /// `:` sets a variable for this packet only.
    Set,
    /// `=` assigns a variable.
    Assign,
    /// `+` adds to a list variable.
    Augment,
    /// `-` removes from a list variable.
    Diminish,
    /// `?` queries a variable.
    Query,
    /// `!` asserts a variable's value.
    Assert,
    /// `@` updates a variable in place.
    Update,
}

impl Oper {
    /// Classifies an operator byte.
    pub fn from_byte(b: u8) -> Option<Oper> {
        Some(match b {
            b':' => Oper::Set,
            b'=' => Oper::Assign,
            b'+' => Oper::Augment,
            b'-' => Oper::Diminish,
            b'?' => Oper::Query,
            b'!' => Oper::Assert,
            b'@' => Oper::Update,
            _ => return None,
        })
    }

    /// The wire byte of this operator.
    pub fn byte(self) -> u8 {
        match self {
            Oper::Set => b':',
            Oper::Assign => b'=',
            Oper::Augment => b'+',
            Oper::Diminish => b'-',
            Oper::Query => b'?',
            Oper::Assert => b'!',
            Oper::Update => b'@',
        }
    }
}

pub(crate) fn is_glyph(b: u8) -> bool {
    Oper::from_byte(b).is_some()
}

pub(crate) fn is_kw_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Returns the position of the first packet delimiter in `hay`.
pub(crate) fn find_delimiter(hay: &[u8]) -> Option<usize> {
    hay.windows(PACKET_DELIMITER.len())
        .position(|w| w == PACKET_DELIMITER)
}

/// Framing decision for a single modifier line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierFlag {
    /// Decide between the short and the length-prefixed form when the
    /// modifier is built.
    Check,
    /// Short form, the value is terminated by LF.
    NoLength,
    /// The line carries a decimal byte count before the value.
    NeedLength,
    /// Routing modifiers are always short form but counted towards the
    /// routing header.
    Routing,
}

/// Framing decision for a whole packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketFlag {
    /// Decide when the packet is built.
    Check,
    /// The content is terminated by the packet delimiter alone.
    NoLength,
    /// The header carries the decimal content length.
    NeedLength,
}

/// Framing decision for a list value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFlag {
    /// Decide when the list is built.
    Check,
    /// `|elem` per element.
    NoLength,
    /// `length SP elem` per element, separated by `|`.
    NeedLength,
}

/// A single modifier: operator, variable name, value and framing flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modifier<'a> {
    /// Operator byte of the line.
    pub oper: Oper,
    /// Variable name, without the operator.
    pub name: &'a [u8],
    /// Value bytes.
    pub value: &'a [u8],
    /// Resolved framing flag.
    pub flag: ModifierFlag,
}

impl<'a> Modifier<'a> {
    /// Builds a modifier, resolving [`ModifierFlag::Check`] against the
    /// value.
    pub fn new(oper: Oper, name: &'a [u8], value: &'a [u8], flag: ModifierFlag) -> Self {
        let flag = match flag {
            ModifierFlag::Check => Self::check_length(value),
            f => f,
        };
        Modifier {
            oper,
            name,
            value,
            flag,
        }
    }

    /// Builds a routing modifier. Routing modifiers never carry an inline
    /// length, so their values must not contain LF.
    pub fn routing(oper: Oper, name: &'a [u8], value: &'a [u8]) -> Self {
        Modifier {
            oper,
            name,
            value,
            flag: ModifierFlag::Routing,
        }
    }

    /// A value needs a length prefix when LF termination can't represent it.
    fn check_length(value: &[u8]) -> ModifierFlag {
        if value.contains(&b'\n') || value.len() > MODIFIER_SIZE_THRESHOLD {
            ModifierFlag::NeedLength
        } else {
            ModifierFlag::NoLength
        }
    }

    /// Serialized length of the modifier line.
    pub fn wire_len(&self) -> usize {
        let mut len = 1 + self.name.len() + 1 + self.value.len() + 1; // oper name \t value \n
        if self.flag == ModifierFlag::NeedLength {
            len += num_digits(self.value.len()) + 1; // SP length
        }
        len
    }
}

/// A packet assembled for rendering.
///
/// Holds either entity modifiers, method and data, or (in raw-content
/// mode) a single opaque `content` block, never both.
#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    /// Routing header modifiers.
    pub routing: &'a [Modifier<'a>],
    /// Entity modifiers of the content.
    pub entity: &'a [Modifier<'a>],
    /// Method naming the message kind.
    pub method: &'a [u8],
    /// Data block of the packet body.
    pub data: &'a [u8],
    /// Opaque content, used instead of entity/method/data.
    pub content: &'a [u8],
    /// Resolved framing flag.
    pub flag: PacketFlag,
    routing_length: usize,
    content_length: usize,
    length: usize,
}

impl<'a> Packet<'a> {
    /// Builds a packet from routing and entity modifiers, method and data,
    /// resolving [`PacketFlag::Check`] and computing the serialized
    /// lengths.
    pub fn new(
        routing: &'a [Modifier<'a>],
        entity: &'a [Modifier<'a>],
        method: &'a [u8],
        data: &'a [u8],
        flag: PacketFlag,
    ) -> Self {
        let mut p = Packet {
            routing,
            entity,
            method,
            data,
            content: &[],
            flag,
            routing_length: 0,
            content_length: 0,
            length: 0,
        };
        if p.flag == PacketFlag::Check {
            p.flag = p.check_length();
        }
        p.set_length();
        p
    }

    /// Builds a raw-content packet: the content block replaces entity
    /// modifiers, method and data verbatim.
    pub fn new_raw(routing: &'a [Modifier<'a>], content: &'a [u8], flag: PacketFlag) -> Self {
        let mut p = Packet {
            routing,
            entity: &[],
            method: &[],
            data: &[],
            content,
            flag,
            routing_length: 0,
            content_length: 0,
            length: 0,
        };
        if p.flag == PacketFlag::Check {
            p.flag = p.check_length();
        }
        p.set_length();
        p
    }

    /// A packet needs a content length when its data could be mistaken for
    /// the packet delimiter.
    fn check_length(&self) -> PacketFlag {
        if self.data == b"|" {
            return PacketFlag::NeedLength;
        }
        if self.data.len() > CONTENT_SIZE_THRESHOLD {
            return PacketFlag::NeedLength;
        }
        // entity modifiers that need a length may contain a packet
        // terminator, so the content needs a length as well
        if self
            .entity
            .iter()
            .any(|m| m.flag == ModifierFlag::NeedLength)
        {
            return PacketFlag::NeedLength;
        }
        if find_delimiter(self.data).is_some() {
            return PacketFlag::NeedLength;
        }
        PacketFlag::NoLength
    }

    fn set_length(&mut self) {
        self.routing_length = self.routing.iter().map(Modifier::wire_len).sum();

        self.content_length = if !self.content.is_empty() {
            self.content.len()
        } else {
            let mut len: usize = self.entity.iter().map(Modifier::wire_len).sum();
            if !self.method.is_empty() {
                len += self.method.len() + 1; // method \n
            }
            if !self.data.is_empty() {
                len += self.data.len() + 1; // data \n
            }
            len
        };

        // routing header, content, "|\n"
        self.length = self.routing_length + self.content_length + 2;

        if self.content_length > 0 || self.flag == PacketFlag::NeedLength {
            self.length += 1; // \n opening the content part
        }
        if self.flag == PacketFlag::NeedLength {
            self.length += num_digits(self.content_length);
        }
    }

    /// Serialized length of the routing header.
    pub fn routing_length(&self) -> usize {
        self.routing_length
    }

    /// Serialized length of the content part.
    pub fn content_length(&self) -> usize {
        self.content_length
    }

    /// Total serialized length of the packet.
    pub fn length(&self) -> usize {
        self.length
    }
}

/// A list value assembled for rendering.
#[derive(Debug, Clone, Copy)]
pub struct List<'a> {
    /// List elements.
    pub elems: &'a [&'a [u8]],
    /// Resolved framing flag.
    pub flag: ListFlag,
    length: usize,
}

impl<'a> List<'a> {
    /// Builds a list, resolving [`ListFlag::Check`] and computing the
    /// serialized length.
    pub fn new(elems: &'a [&'a [u8]], flag: ListFlag) -> Self {
        let mut list = List {
            elems,
            flag,
            length: 0,
        };
        if list.flag == ListFlag::Check {
            list.flag = list.check_length();
        }
        list.length = list.wire_len();
        list
    }

    /// A list needs element lengths once an element could be mistaken for
    /// a delimiter or the short form grows too large.
    fn check_length(&self) -> ListFlag {
        let mut length = 0;
        for elem in self.elems {
            length += 1 + elem.len(); // |elem
            if length > MODIFIER_SIZE_THRESHOLD
                || elem.contains(&b'|')
                || elem.contains(&b'\n')
            {
                return ListFlag::NeedLength;
            }
        }
        ListFlag::NoLength
    }

    fn wire_len(&self) -> usize {
        let mut length = 0;
        if self.flag == ListFlag::NeedLength {
            for (i, elem) in self.elems.iter().enumerate() {
                if i > 0 {
                    length += 1; // |
                }
                length += num_digits(elem.len()) + 1 + elem.len(); // length SP elem
            }
        } else {
            for elem in self.elems {
                length += 1 + elem.len(); // |elem
            }
        }
        length
    }

    /// Serialized length of the list.
    pub fn length(&self) -> usize {
        self.length
    }
}
