//! Byte-level codec for primitive values: reading a `PrimType`'s bytes out
//! of a register file or arena slice, and writing one back. Kept separate
//! from `interp.rs` dispatch so the per-primitive-width match lives in one
//! place, mirroring how `icarus_ir::builder`'s `fold` module isolates its
//! own per-primitive arithmetic from `Builder`'s dispatch.

use icarus_ir::Immediate;
use icarus_types::PrimType;

/// A decoded scalar value, wide enough to carry any `PrimType`. Signed and
/// unsigned integers both normalize into `I`/`U` by width-appropriate
/// sign/zero extension; arithmetic on them reads back out through
/// `as_i64`/`as_f64` the same way `Immediate` does.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    I(i64),
    U(u64),
    F(f64),
    Bool(bool),
    Char(char),
}

impl Scalar {
    pub fn as_i64(self) -> i64 {
        match self {
            Scalar::I(v) => v,
            Scalar::U(v) => v as i64,
            Scalar::F(v) => v as i64,
            Scalar::Bool(v) => v as i64,
            Scalar::Char(v) => v as i64,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::F(v) => v,
            other => other.as_i64() as f64,
        }
    }

    pub fn as_bool(self) -> bool {
        match self {
            Scalar::Bool(v) => v,
            other => other.as_i64() != 0,
        }
    }
}

impl From<Immediate> for Scalar {
    fn from(imm: Immediate) -> Self {
        match imm {
            Immediate::Bool(v) => Scalar::Bool(v),
            Immediate::I8(v) => Scalar::I(v as i64),
            Immediate::I16(v) => Scalar::I(v as i64),
            Immediate::I32(v) => Scalar::I(v as i64),
            Immediate::I64(v) => Scalar::I(v),
            Immediate::U8(v) => Scalar::U(v as u64),
            Immediate::U16(v) => Scalar::U(v as u64),
            Immediate::U32(v) => Scalar::U(v as u64),
            Immediate::U64(v) => Scalar::U(v),
            Immediate::F32(v) => Scalar::F(v as f64),
            Immediate::F64(v) => Scalar::F(v),
            Immediate::Char(v) => Scalar::Char(v),
            Immediate::Addr(_) | Immediate::StringRef(_) | Immediate::FuncRef(_) | Immediate::TypeHandle(_) => {
                panic!("{imm:?} is not a scalar primitive value")
            }
        }
    }
}

/// Decodes `prim`'s little-endian byte representation out of `bytes`
/// (exactly `byte_width(prim)` bytes).
pub fn read(bytes: &[u8], prim: PrimType) -> Scalar {
    match prim {
        PrimType::Bool => Scalar::Bool(bytes[0] != 0),
        PrimType::I8 => Scalar::I(bytes[0] as i8 as i64),
        PrimType::U8 => Scalar::U(bytes[0] as u64),
        PrimType::I16 => Scalar::I(i16::from_le_bytes(bytes[0..2].try_into().unwrap()) as i64),
        PrimType::U16 => Scalar::U(u16::from_le_bytes(bytes[0..2].try_into().unwrap()) as u64),
        PrimType::I32 => Scalar::I(i32::from_le_bytes(bytes[0..4].try_into().unwrap()) as i64),
        PrimType::U32 => Scalar::U(u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as u64),
        PrimType::F32 => Scalar::F(f32::from_le_bytes(bytes[0..4].try_into().unwrap()) as f64),
        PrimType::Char => {
            let code = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
            Scalar::Char(char::from_u32(code).unwrap_or('\u{FFFD}'))
        }
        PrimType::I64 => Scalar::I(i64::from_le_bytes(bytes[0..8].try_into().unwrap())),
        PrimType::U64 => Scalar::U(u64::from_le_bytes(bytes[0..8].try_into().unwrap())),
        PrimType::F64 => Scalar::F(f64::from_le_bytes(bytes[0..8].try_into().unwrap())),
    }
}

/// Encodes `value` as `prim`'s little-endian byte representation.
pub fn write(prim: PrimType, value: Scalar) -> Vec<u8> {
    match prim {
        PrimType::Bool => vec![value.as_bool() as u8],
        PrimType::I8 => vec![value.as_i64() as i8 as u8],
        PrimType::U8 => vec![value.as_i64() as u8],
        PrimType::I16 => (value.as_i64() as i16).to_le_bytes().to_vec(),
        PrimType::U16 => (value.as_i64() as u16).to_le_bytes().to_vec(),
        PrimType::I32 => (value.as_i64() as i32).to_le_bytes().to_vec(),
        PrimType::U32 => (value.as_i64() as u32).to_le_bytes().to_vec(),
        PrimType::I64 => value.as_i64().to_le_bytes().to_vec(),
        PrimType::U64 => (value.as_i64() as u64).to_le_bytes().to_vec(),
        PrimType::F32 => (value.as_f64() as f32).to_le_bytes().to_vec(),
        PrimType::F64 => value.as_f64().to_le_bytes().to_vec(),
        PrimType::Char => match value {
            Scalar::Char(c) => (c as u32).to_le_bytes().to_vec(),
            other => (other.as_i64() as u32).to_le_bytes().to_vec(),
        },
    }
}

/// Renders a scalar the way the `Print` opcode writes it to the output
/// sink: the same textual form `Immediate`'s `Display` impl would produce,
/// minus the type suffix (the prim is already implied by the call site).
pub fn format(value: Scalar) -> String {
    match value {
        Scalar::I(v) => v.to_string(),
        Scalar::U(v) => v.to_string(),
        Scalar::F(v) => v.to_string(),
        Scalar::Bool(v) => v.to_string(),
        Scalar::Char(v) => v.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn round_trips_every_primitive_width() {
        for (prim, scalar) in [
            (PrimType::I8, Scalar::I(-5)),
            (PrimType::U8, Scalar::U(200)),
            (PrimType::I16, Scalar::I(-1000)),
            (PrimType::U16, Scalar::U(60000)),
            (PrimType::I32, Scalar::I(-70000)),
            (PrimType::U32, Scalar::U(4_000_000_000)),
            (PrimType::I64, Scalar::I(i64::MIN)),
            (PrimType::U64, Scalar::U(u64::MAX)),
            (PrimType::Bool, Scalar::Bool(true)),
            (PrimType::Char, Scalar::Char('z')),
        ] {
            let bytes = write(prim, scalar);
            let back = read(&bytes, prim);
            assert_eq!(back.as_i64(), scalar.as_i64(), "prim {prim:?} round trip");
        }
    }

    #[test]
    fn floats_round_trip_through_their_own_width() {
        let bytes = write(PrimType::F32, Scalar::F(1.5));
        assert_eq!(read(&bytes, PrimType::F32).as_f64(), 1.5);
        let bytes = write(PrimType::F64, Scalar::F(-2.25));
        assert_eq!(read(&bytes, PrimType::F64).as_f64(), -2.25);
    }

    proptest::proptest! {
        #[test]
        fn i32_round_trips_across_the_full_value_range(value in any::<i32>()) {
            let bytes = write(PrimType::I32, Scalar::I(value as i64));
            prop_assert_eq!(read(&bytes, PrimType::I32).as_i64(), value as i64);
        }

        #[test]
        fn u64_round_trips_across_the_full_value_range(value in any::<u64>()) {
            let bytes = write(PrimType::U64, Scalar::U(value));
            prop_assert_eq!(read(&bytes, PrimType::U64).as_i64(), value as i64);
        }
    }
}
