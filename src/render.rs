//! Serializers for packets and lists.
//!
//! Rendering emits exactly the bytes accounted for by
//! [`Packet::length`](crate::Packet::length) into any
//! [`Buffer`](crate::util::Buffer); a buffer that cannot hold the packet
//! makes the render fail instead of truncating.

use crate::num::render_num;
use crate::packet::{List, ListFlag, Modifier, ModifierFlag, Packet, PacketFlag};
use crate::util::{Buffer, OutOfMemory};

/// Error type used by the renderers.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RenderError {
    /// Data is present but the method is missing.
    MethodMissing,
    /// A modifier has an empty name.
    ModifierNameMissing,
    /// The output buffer is too small for the packet.
    OutOfMemory,
}

impl From<OutOfMemory> for RenderError {
    fn from(_: OutOfMemory) -> Self {
        RenderError::OutOfMemory
    }
}

impl core::fmt::Display for RenderError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            RenderError::MethodMissing => "data is present but the method is missing",
            RenderError::ModifierNameMissing => "a modifier has an empty name",
            RenderError::OutOfMemory => "output buffer is too small",
        })
    }
}

#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
impl std::error::Error for RenderError {}

/// Renders one modifier line: `oper name [SP length] TAB value LF`.
pub fn render_modifier<B: Buffer>(modifier: &Modifier, out: &mut B) -> Result<(), OutOfMemory> {
    out.push(modifier.oper.byte())?;
    out.extend_from_slice(modifier.name)?;
    if modifier.flag == ModifierFlag::NeedLength {
        out.push(b' ')?;
        render_num(modifier.value.len(), out)?;
    }
    out.push(b'\t')?;
    out.extend_from_slice(modifier.value)?;
    out.push(b'\n')
}

/// Renders a packet into a fresh buffer.
///
/// The packet must have been built with [`Packet::new`] or
/// [`Packet::new_raw`] so its framing flag and lengths are resolved.
pub fn render<B: Buffer>(packet: &Packet) -> Result<B, RenderError> {
    if packet.content.is_empty() && !packet.data.is_empty() && packet.method.is_empty() {
        return Err(RenderError::MethodMissing);
    }
    if packet
        .routing
        .iter()
        .chain(packet.entity)
        .any(|m| m.name.is_empty())
    {
        return Err(RenderError::ModifierNameMissing);
    }

    let mut out = B::default();

    for modifier in packet.routing {
        render_modifier(modifier, &mut out)?;
    }

    // the content part opens with its optional decimal length and one LF
    if packet.content_length() > 0 || packet.flag == PacketFlag::NeedLength {
        if packet.flag == PacketFlag::NeedLength {
            render_num(packet.content_length(), &mut out)?;
        }
        out.push(b'\n')?;
    }

    if !packet.content.is_empty() {
        out.extend_from_slice(packet.content)?;
    } else {
        for modifier in packet.entity {
            render_modifier(modifier, &mut out)?;
        }
        if !packet.method.is_empty() {
            out.extend_from_slice(packet.method)?;
            out.push(b'\n')?;
        }
        if !packet.data.is_empty() {
            out.extend_from_slice(packet.data)?;
            out.push(b'\n')?;
        }
    }

    out.extend_from_slice(b"|\n")?;
    Ok(out)
}

/// Renders a list value into a fresh buffer.
pub fn render_list<B: Buffer>(list: &List) -> Result<B, OutOfMemory> {
    let mut out = B::default();
    if list.flag == ListFlag::NeedLength {
        for (i, elem) in list.elems.iter().enumerate() {
            if i > 0 {
                out.push(b'|')?;
            }
            render_num(elem.len(), &mut out)?;
            out.push(b' ')?;
            out.extend_from_slice(elem)?;
        }
    } else {
        for elem in list.elems {
            out.push(b'|')?;
            out.extend_from_slice(elem)?;
        }
    }
    Ok(out)
}
