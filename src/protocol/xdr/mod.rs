//! XDR (External Data Representation, RFC 4506) encoding layer.
//!
//! Everything NFS puts on the wire is fixed big-endian XDR. The
//! [`Serialize`] and [`Deserialize`] traits are implemented for the
//! primitives here and derived for protocol structures through the
//! `SerializeStruct!`/`DeserializeStruct!` family of macros below.
//!
//! Deserialization is written against `&mut self` so that structures can
//! be built up field by field from their `Default` values; the
//! free-standing [`deserialize`] helper wraps that into the usual
//! value-returning shape.

use std::io::{Read, Write};

use byteorder::BigEndian;
use byteorder::{ReadBytesExt, WriteBytesExt};

pub mod nfs3;
pub mod rpc;

/// Endianness of every XDR field.
pub type XdrEndian = BigEndian;

/// Serializes a value into an XDR byte stream.
pub trait Serialize {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()>;
}

/// Deserializes a value in place from an XDR byte stream.
pub trait Deserialize {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()>;
}

/// Reads one `T` from the stream, starting from its default value.
pub fn deserialize<T: Deserialize + Default>(src: &mut impl Read) -> std::io::Result<T> {
    let mut value = T::default();
    value.deserialize(src)?;
    Ok(value)
}

/// Builds an `InvalidData` error for malformed wire input.
pub fn invalid_data(message: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message)
}

/// Booleans travel as a full 4-byte word; anything non-zero is true.
impl Serialize for bool {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u32::<XdrEndian>(*self as u32)
    }
}

impl Deserialize for bool {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u32::<XdrEndian>()? > 0;
        Ok(())
    }
}

impl Serialize for u32 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u32::<XdrEndian>(*self)
    }
}

impl Deserialize for u32 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u32::<XdrEndian>()?;
        Ok(())
    }
}

impl Serialize for u64 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u64::<XdrEndian>(*self)
    }
}

impl Deserialize for u64 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u64::<XdrEndian>()?;
        Ok(())
    }
}

/// Fixed-size opaques carry no length prefix and no padding of their own;
/// the protocol only uses multiples of four.
impl<const N: usize> Serialize for [u8; N] {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_all(self)
    }
}

impl<const N: usize> Deserialize for [u8; N] {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        src.read_exact(self)
    }
}

/// Variable-length opaques: 4-byte length, data, zero padding to a
/// 4-byte boundary.
impl Serialize for Vec<u8> {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        assert!(self.len() < u32::MAX as usize);
        let length = self.len() as u32;
        length.serialize(dest)?;
        dest.write_all(self)?;
        let pad = ((4 - length % 4) % 4) as usize;
        if pad > 0 {
            dest.write_all(&[0u8; 4][..pad])?;
        }
        Ok(())
    }
}

impl Deserialize for Vec<u8> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let length = deserialize::<u32>(src)?;
        self.resize(length as usize, 0);
        src.read_exact(self)?;
        let pad = ((4 - length % 4) % 4) as usize;
        let mut scratch = [0u8; 4];
        src.read_exact(&mut scratch[..pad])?;
        Ok(())
    }
}

/// Implements [`Serialize`] for a struct by writing each named field in
/// declaration order.
#[macro_export]
macro_rules! SerializeStruct {
    ($t:ident, $($field:ident),*) => {
        impl Serialize for $t {
            fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
                $(self.$field.serialize(dest)?;)*
                Ok(())
            }
        }
    };
}

/// Implements [`Deserialize`] for a struct by reading each named field in
/// declaration order.
#[macro_export]
macro_rules! DeserializeStruct {
    ($t:ident, $($field:ident),*) => {
        impl Deserialize for $t {
            fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                $(self.$field.deserialize(src)?;)*
                Ok(())
            }
        }
    };
}

/// Implements [`Serialize`] for a `#[repr(u32)]` enum as a 4-byte
/// discriminant.
#[macro_export]
macro_rules! SerializeEnum {
    ($t:ident) => {
        impl Serialize for $t {
            fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
                (*self as u32).serialize(dest)
            }
        }
    };
}

/// Implements [`Deserialize`] for a `#[repr(u32)]` enum via
/// `FromPrimitive`, rejecting unknown discriminants.
#[macro_export]
macro_rules! DeserializeEnum {
    ($t:ident) => {
        impl Deserialize for $t {
            fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                let raw = $crate::protocol::xdr::deserialize::<u32>(src)?;
                *self = FromPrimitive::from_u32(raw).ok_or_else(|| {
                    $crate::protocol::xdr::invalid_data(format!(
                        "invalid {} discriminant: {raw}",
                        stringify!($t)
                    ))
                })?;
                Ok(())
            }
        }
    };
}

/// Implements [`Serialize`] for the common XDR union discriminated by a
/// boolean: a void arm and a payload arm.
#[macro_export]
macro_rules! SerializeBoolUnion {
    ($t:ident, $case:ident, $payload:ty) => {
        impl Serialize for $t {
            fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
                match self {
                    $t::Void => false.serialize(dest),
                    $t::$case(v) => {
                        true.serialize(dest)?;
                        v.serialize(dest)
                    }
                }
            }
        }
    };
}

/// Implements [`Deserialize`] for a boolean-discriminated XDR union.
#[macro_export]
macro_rules! DeserializeBoolUnion {
    ($t:ident, $case:ident, $payload:ty) => {
        impl Deserialize for $t {
            fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                if $crate::protocol::xdr::deserialize::<bool>(src)? {
                    *self = $t::$case($crate::protocol::xdr::deserialize::<$payload>(src)?);
                } else {
                    *self = $t::Void;
                }
                Ok(())
            }
        }
    };
}

pub use crate::DeserializeBoolUnion;
pub use crate::DeserializeEnum;
pub use crate::DeserializeStruct;
pub use crate::SerializeBoolUnion;
pub use crate::SerializeEnum;
pub use crate::SerializeStruct;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip<T: Serialize + Deserialize + Default + PartialEq + std::fmt::Debug>(value: T) {
        let mut buf = Vec::new();
        value.serialize(&mut buf).expect("serialize");
        assert_eq!(buf.len() % 4, 0, "XDR output must stay 4-byte aligned");
        let back = deserialize::<T>(&mut Cursor::new(&buf)).expect("deserialize");
        assert_eq!(value, back);
    }

    #[test]
    fn scalar_round_trips() {
        round_trip(true);
        round_trip(false);
        round_trip(0u32);
        round_trip(u32::MAX);
        round_trip(0u64);
        round_trip(u64::MAX);
        round_trip([0xAAu8; 8]);
    }

    #[test]
    fn opaque_round_trips_with_padding() {
        for len in 0..9usize {
            round_trip((0..len as u8).collect::<Vec<u8>>());
        }
    }

    #[test]
    fn opaque_padding_is_zero() {
        let mut buf = Vec::new();
        vec![1u8, 2, 3].serialize(&mut buf).expect("serialize");
        assert_eq!(buf, [0, 0, 0, 3, 1, 2, 3, 0]);
    }
}
