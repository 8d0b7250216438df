//! Decoding a raw output buffer back into a typed value tree, per output
//! type (spec §4.5: "dispatching on primitive kind, pointer, function
//! reference, ... etc."). Leaf values reuse `icarus_ir::Immediate` as the
//! decoded representation rather than inventing a parallel scalar type —
//! it is already exactly the "dynamic typing escape hatch" this needs.

use crate::scalar;
use icarus_ir::{Address, Immediate};
use icarus_types::layout::{self, Arch};
use icarus_types::{PrimType, Type};

/// A fully decoded compile-time value. Composite cases recurse over the
/// aggregate's own field/element types; a variant's payload is left as raw
/// bytes because deciding which alternative is active requires the type
/// registry the core deliberately doesn't own (see DESIGN.md).
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Scalar(Immediate),
    Tuple(Vec<TypedValue>),
    Array(Vec<TypedValue>),
    /// A dynamically-sized array: the `i32` length prefix plus the data
    /// pointer, neither of which this decoder can chase without also
    /// having the heap/stack arena the pointer is relative to.
    DynamicArray { length: u32, data: Address },
    Struct { name: String, fields: Vec<(String, TypedValue)> },
    Variant { tag: u64, payload: Vec<u8> },
}

/// Decodes `bytes` (exactly `layout::size(ty, arch)` long) into a
/// `TypedValue` per `ty`'s shape.
pub fn decode(bytes: &[u8], ty: &Type, arch: Arch) -> TypedValue {
    match ty {
        Type::Primitive(p) => TypedValue::Scalar(scalar_to_immediate(*p, scalar::read(bytes, *p))),
        Type::Pointer(_) | Type::BufferPointer(_) | Type::BlockSequence => {
            let word = read_word(bytes, arch);
            TypedValue::Scalar(Immediate::Addr(Address::from_word(word, arch)))
        }
        Type::Function(_) => TypedValue::Scalar(Immediate::FuncRef(read_word(bytes, arch) as u32)),
        Type::Flags(_) => TypedValue::Scalar(Immediate::U64(read_word(bytes, arch))),
        Type::Tuple(fields) => {
            let offsets = layout::field_offsets(fields, arch);
            TypedValue::Tuple(
                fields
                    .iter()
                    .zip(offsets)
                    .map(|(f, off)| decode(&bytes[off as usize..], f, arch))
                    .collect(),
            )
        }
        Type::Struct(s) => {
            let field_tys: Vec<Type> = s.fields.iter().map(|f| f.ty.clone()).collect();
            let offsets = layout::field_offsets(&field_tys, arch);
            let fields = s
                .fields
                .iter()
                .zip(offsets)
                .map(|(f, off)| (f.name.clone(), decode(&bytes[off as usize..], &f.ty, arch)))
                .collect();
            TypedValue::Struct { name: s.name.clone(), fields }
        }
        Type::Array { element, length: Some(n) } => {
            let stride = layout::size(element, arch);
            TypedValue::Array(
                (0..*n).map(|i| decode(&bytes[(i * stride) as usize..], element, arch)).collect(),
            )
        }
        Type::Array { element: _, length: None } => {
            let length = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
            let ptr_off = layout::move_forward_to_alignment(4, arch.pointer_size());
            let word = read_word(&bytes[ptr_off as usize..], arch);
            TypedValue::DynamicArray { length, data: Address::from_word(word, arch) }
        }
        Type::Variant(alts) => {
            let tag = read_word(bytes, arch);
            let payload_off = layout::variant_payload_offset(alts, arch);
            let payload_size = alts.iter().map(|a| layout::size(a, arch)).max().unwrap_or(0);
            let payload = bytes[payload_off as usize..(payload_off + payload_size) as usize].to_vec();
            TypedValue::Variant { tag, payload }
        }
    }
}

fn read_word(bytes: &[u8], arch: Arch) -> u64 {
    let width = arch.pointer_size() as usize;
    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(&bytes[..width]);
    u64::from_le_bytes(buf)
}

fn scalar_to_immediate(prim: PrimType, value: scalar::Scalar) -> Immediate {
    match prim {
        PrimType::Bool => Immediate::Bool(value.as_bool()),
        PrimType::I8 => Immediate::I8(value.as_i64() as i8),
        PrimType::I16 => Immediate::I16(value.as_i64() as i16),
        PrimType::I32 => Immediate::I32(value.as_i64() as i32),
        PrimType::I64 => Immediate::I64(value.as_i64()),
        PrimType::U8 => Immediate::U8(value.as_i64() as u8),
        PrimType::U16 => Immediate::U16(value.as_i64() as u16),
        PrimType::U32 => Immediate::U32(value.as_i64() as u32),
        PrimType::U64 => Immediate::U64(value.as_i64() as u64),
        PrimType::F32 => Immediate::F32(value.as_f64() as f32),
        PrimType::F64 => Immediate::F64(value.as_f64()),
        PrimType::Char => match value {
            scalar::Scalar::Char(c) => Immediate::Char(c),
            other => Immediate::Char(char::from_u32(other.as_i64() as u32).unwrap_or('\u{FFFD}')),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icarus_types::{StructField, StructType};
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_a_primitive() {
        let bytes = scalar::write(PrimType::I32, scalar::Scalar::I(42));
        let decoded = decode(&bytes, &Type::Primitive(PrimType::I32), Arch::X86_64);
        assert_eq!(decoded, TypedValue::Scalar(Immediate::I32(42)));
    }

    #[test]
    fn decodes_a_padded_tuple() {
        let ty = Type::Tuple(vec![Type::Primitive(PrimType::I8), Type::Primitive(PrimType::I32)]);
        let mut bytes = vec![0u8; layout::size(&ty, Arch::X86_64) as usize];
        bytes[0] = 7;
        bytes[4..8].copy_from_slice(&99i32.to_le_bytes());
        let decoded = decode(&bytes, &ty, Arch::X86_64);
        assert_eq!(
            decoded,
            TypedValue::Tuple(vec![
                TypedValue::Scalar(Immediate::I8(7)),
                TypedValue::Scalar(Immediate::I32(99)),
            ])
        );
    }

    #[test]
    fn decodes_a_struct_by_field_name() {
        let ty = Type::Struct(StructType {
            name: "Point".into(),
            fields: vec![
                StructField { name: "x".into(), ty: Type::Primitive(PrimType::I32) },
                StructField { name: "y".into(), ty: Type::Primitive(PrimType::I32) },
            ],
        });
        let mut bytes = vec![0u8; layout::size(&ty, Arch::X86_64) as usize];
        bytes[0..4].copy_from_slice(&3i32.to_le_bytes());
        bytes[4..8].copy_from_slice(&4i32.to_le_bytes());
        let decoded = decode(&bytes, &ty, Arch::X86_64);
        match decoded {
            TypedValue::Struct { name, fields } => {
                assert_eq!(name, "Point");
                assert_eq!(fields[0], ("x".to_string(), TypedValue::Scalar(Immediate::I32(3))));
                assert_eq!(fields[1], ("y".to_string(), TypedValue::Scalar(Immediate::I32(4))));
            }
            other => panic!("expected a struct, got {other:?}"),
        }
    }

    #[test]
    fn decodes_a_fixed_array_element_by_element() {
        let ty = Type::Array { element: Box::new(Type::Primitive(PrimType::U8)), length: Some(3) };
        let decoded = decode(&[10, 20, 30], &ty, Arch::X86_64);
        assert_eq!(
            decoded,
            TypedValue::Array(vec![
                TypedValue::Scalar(Immediate::U8(10)),
                TypedValue::Scalar(Immediate::U8(20)),
                TypedValue::Scalar(Immediate::U8(30)),
            ])
        );
    }
}
