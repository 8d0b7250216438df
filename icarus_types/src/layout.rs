//! Size and alignment rules for [`crate::Type`], parameterized over a
//! target [`Arch`]. Every register reservation in the builder and every
//! memory access in the interpreter routes through here.

use crate::{PrimType, Type};

/// Target architecture profile. The core only cares about pointer width;
/// byte order is assumed to match the host running the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arch {
    X86_64,
    Arm64,
    Wasm32,
}

use serde::{Deserialize, Serialize};

impl Arch {
    pub fn pointer_size(self) -> u32 {
        match self {
            Arch::X86_64 | Arch::Arm64 => 8,
            Arch::Wasm32 => 4,
        }
    }
}

impl Default for Arch {
    fn default() -> Self {
        Arch::X86_64
    }
}

fn prim_size(p: PrimType) -> u32 {
    match p {
        PrimType::I8 | PrimType::U8 | PrimType::Bool => 1,
        PrimType::I16 | PrimType::U16 => 2,
        PrimType::I32 | PrimType::U32 | PrimType::F32 | PrimType::Char => 4,
        PrimType::I64 | PrimType::U64 | PrimType::F64 => 8,
    }
}

/// Next offset `>= offset` that is a multiple of `align`. `align` must be a
/// power of two.
pub fn move_forward_to_alignment(offset: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two(), "alignment must be a power of two, got {align}");
    (offset + align - 1) & !(align - 1)
}

/// Byte size of `ty` under `arch`.
pub fn size(ty: &Type, arch: Arch) -> u32 {
    match ty {
        Type::Primitive(p) => prim_size(*p),
        Type::Pointer(_) | Type::BufferPointer(_) | Type::BlockSequence => arch.pointer_size(),
        Type::Array { element, length: Some(n) } => size(element, arch) * n,
        // Dynamically-sized array: leading i32 length prefix, then the data pointer.
        Type::Array { element: _, length: None } => {
            let mut offset = 4;
            offset = move_forward_to_alignment(offset, arch.pointer_size());
            offset + arch.pointer_size()
        }
        Type::Tuple(fields) => tuple_size(fields, arch),
        Type::Struct(s) => {
            let field_types: Vec<Type> = s.fields.iter().map(|f| f.ty.clone()).collect();
            tuple_size(&field_types, arch)
        }
        Type::Variant(alts) => variant_size(alts, arch),
        // A function type is never stored by value; a reference to one is pointer-sized.
        Type::Function(_) => arch.pointer_size(),
        Type::Flags(_) => 8,
    }
}

/// Alignment (a power of two) of `ty` under `arch`.
pub fn align(ty: &Type, arch: Arch) -> u32 {
    match ty {
        Type::Primitive(p) => prim_size(*p).max(1),
        Type::Pointer(_) | Type::BufferPointer(_) | Type::BlockSequence => arch.pointer_size(),
        Type::Array { element, .. } => align(element, arch),
        Type::Tuple(fields) => fields.iter().map(|f| align(f, arch)).max().unwrap_or(1),
        Type::Struct(s) => s.fields.iter().map(|f| align(&f.ty, arch)).max().unwrap_or(1),
        Type::Variant(alts) => variant_tag_align(arch).max(
            alts.iter().map(|a| align(a, arch)).max().unwrap_or(1),
        ),
        Type::Function(_) => arch.pointer_size(),
        Type::Flags(_) => 8,
    }
}

/// Whether `ty` is passed/returned by address rather than by value. The
/// threshold mirrors common ABI practice: anything wider than two pointer
/// widths is "big".
pub fn is_big(ty: &Type, arch: Arch) -> bool {
    size(ty, arch) > 2 * arch.pointer_size()
}

fn tuple_size(fields: &[Type], arch: Arch) -> u32 {
    let mut offset = 0;
    for f in fields {
        offset = move_forward_to_alignment(offset, align(f, arch));
        offset += size(f, arch);
    }
    let whole_align = fields.iter().map(|f| align(f, arch)).max().unwrap_or(1);
    move_forward_to_alignment(offset, whole_align)
}

/// Byte offset of each field of a struct/tuple-like aggregate, in order.
pub fn field_offsets(fields: &[Type], arch: Arch) -> Vec<u32> {
    let mut offsets = Vec::with_capacity(fields.len());
    let mut offset = 0;
    for f in fields {
        offset = move_forward_to_alignment(offset, align(f, arch));
        offsets.push(offset);
        offset += size(f, arch);
    }
    offsets
}

/// Alignment of the type-tag handle stored at the front of a variant
/// (modeled as a pointer-sized `Type*` handle, per the type system's
/// external interface contract).
fn variant_tag_align(arch: Arch) -> u32 {
    arch.pointer_size()
}

/// Byte offset of a variant's payload: immediately after the tag, aligned
/// to the payload's own alignment requirement.
pub fn variant_payload_offset(alts: &[Type], arch: Arch) -> u32 {
    let tag_size = arch.pointer_size();
    let payload_align = alts.iter().map(|a| align(a, arch)).max().unwrap_or(1);
    move_forward_to_alignment(tag_size, payload_align)
}

fn variant_size(alts: &[Type], arch: Arch) -> u32 {
    let payload_offset = variant_payload_offset(alts, arch);
    let payload_size = alts.iter().map(|a| size(a, arch)).max().unwrap_or(0);
    move_forward_to_alignment(payload_offset + payload_size, align(&Type::Variant(alts.to_vec()), arch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StructField;
    use pretty_assertions::assert_eq;

    #[test]
    fn primitive_sizes_and_alignments_match() {
        assert_eq!(size(&Type::Primitive(PrimType::I32), Arch::X86_64), 4);
        assert_eq!(align(&Type::Primitive(PrimType::I32), Arch::X86_64), 4);
        assert_eq!(size(&Type::Primitive(PrimType::I64), Arch::X86_64), 8);
    }

    #[test]
    fn struct_fields_are_packed_with_padding() {
        let s = Type::Struct(crate::StructType {
            name: "Pair".into(),
            fields: vec![
                StructField { name: "a".into(), ty: Type::Primitive(PrimType::I8) },
                StructField { name: "b".into(), ty: Type::Primitive(PrimType::I32) },
            ],
        });
        let field_tys: Vec<Type> = vec![Type::Primitive(PrimType::I8), Type::Primitive(PrimType::I32)];
        let offsets = field_offsets(&field_tys, Arch::X86_64);
        assert_eq!(offsets, vec![0, 4]);
        assert_eq!(size(&s, Arch::X86_64), 8);
        assert_eq!(align(&s, Arch::X86_64), 4);
    }

    #[test]
    fn variant_payload_offset_matches_pointer_width() {
        let alts = vec![Type::Primitive(PrimType::Bool), Type::Pointer(Box::new(Type::Primitive(PrimType::I32)))];
        assert_eq!(variant_payload_offset(&alts, Arch::X86_64), 8);
        assert_eq!(variant_payload_offset(&alts, Arch::Wasm32), 4);
    }

    #[test]
    fn move_forward_to_alignment_rounds_up() {
        assert_eq!(move_forward_to_alignment(0, 4), 0);
        assert_eq!(move_forward_to_alignment(1, 4), 4);
        assert_eq!(move_forward_to_alignment(5, 8), 8);
    }

    #[test]
    fn is_big_uses_the_two_pointer_width_threshold() {
        let small = Type::Primitive(PrimType::I64);
        let big = Type::Tuple(vec![
            Type::Primitive(PrimType::I64),
            Type::Primitive(PrimType::I64),
            Type::Primitive(PrimType::I64),
        ]);
        assert!(!is_big(&small, Arch::X86_64));
        assert!(is_big(&big, Arch::X86_64));
    }
}
