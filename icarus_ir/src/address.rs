//! Memory addresses the interpreter dereferences at `Load`/`Store` time.

use serde::{Deserialize, Serialize};

/// A tagged memory location. `Heap` is modeled as an offset into an
/// interpreter-owned byte arena rather than a raw host pointer: the
/// interpreted program never needs an address outside the frame/stack/heap
/// the interpreter itself manages, so a raw pointer would buy nothing but
/// unsafety (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Address {
    /// Forbidden at load/store; dereferencing is a fatal interpreter error.
    Null,
    /// Offset into the current frame's interpreter-owned stack buffer.
    Stack(u32),
    /// Offset into the interpreter's heap arena.
    Heap(u32),
    /// Index into the process-wide global constants table.
    Global(u32),
}

impl Address {
    pub fn is_null(self) -> bool {
        matches!(self, Address::Null)
    }

    pub fn offset_by(self, delta: i64) -> Address {
        match self {
            Address::Null => Address::Null,
            Address::Stack(o) => Address::Stack((o as i64 + delta) as u32),
            Address::Heap(o) => Address::Heap((o as i64 + delta) as u32),
            Address::Global(o) => Address::Global((o as i64 + delta) as u32),
        }
    }
}

impl Address {
    /// Pack this address into a fixed-width word sized to `arch`'s pointer
    /// width, using the top two bits as a kind tag (the same scheme
    /// `Register` uses to tag parameter/output/ordinary identities). This
    /// is how the interpreter's frame register file stores pointer-typed
    /// register values.
    pub fn to_word(self, arch: icarus_types::layout::Arch) -> u64 {
        let width_bits = arch.pointer_size() * 8;
        let tag_shift = width_bits - 2;
        let (tag, offset): (u64, u64) = match self {
            Address::Null => (0, 0),
            Address::Stack(o) => (1, o as u64),
            Address::Heap(o) => (2, o as u64),
            Address::Global(o) => (3, o as u64),
        };
        (tag << tag_shift) | offset
    }

    pub fn from_word(word: u64, arch: icarus_types::layout::Arch) -> Address {
        let width_bits = arch.pointer_size() * 8;
        let tag_shift = width_bits - 2;
        let tag = word >> tag_shift;
        let offset_mask = (1u64 << tag_shift) - 1;
        let offset = (word & offset_mask) as u32;
        match tag {
            0 => Address::Null,
            1 => Address::Stack(offset),
            2 => Address::Heap(offset),
            3 => Address::Global(offset),
            _ => unreachable!("two-bit tag"),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::Null => write!(f, "null"),
            Address::Stack(o) => write!(f, "stack+{o}"),
            Address::Heap(o) => write!(f, "heap+{o}"),
            Address::Global(o) => write!(f, "global[{o}]"),
        }
    }
}
