use super::packet::Packet;
use super::stream::{ExtractError, InputStream, OutputStream};

pub trait Encode {
    fn encode<S: OutputStream + ?Sized>(&self, out: &mut S);
}

pub trait Decode: Sized {
    fn decode<S: InputStream + ?Sized>(input: &mut S) -> Result<Self, ExtractError>;
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode<S: OutputStream + ?Sized>(&self, out: &mut S) {
        (**self).encode(out);
    }
}

macro_rules! impl_int_codec {
    ($($ty:ty),*) => {
        $(
            impl Encode for $ty {
                fn encode<S: OutputStream + ?Sized>(&self, out: &mut S) {
                    out.write_bytes(&self.to_be_bytes());
                }
            }

            impl Decode for $ty {
                fn decode<S: InputStream + ?Sized>(input: &mut S) -> Result<Self, ExtractError> {
                    let mut buf = [0u8; size_of::<$ty>()];
                    input.read_bytes_into(&mut buf)?;
                    Ok(<$ty>::from_be_bytes(buf))
                }
            }
        )*
    };
}

impl_int_codec!(i8, i16, i32, i64, u8, u16, u32, u64);

impl Encode for bool {
    fn encode<S: OutputStream + ?Sized>(&self, out: &mut S) {
        out.write_bytes(&[u8::from(*self)]);
    }
}

impl Decode for bool {
    fn decode<S: InputStream + ?Sized>(input: &mut S) -> Result<Self, ExtractError> {
        Ok(u8::decode(input)? != 0)
    }
}

impl Encode for f32 {
    fn encode<S: OutputStream + ?Sized>(&self, out: &mut S) {
        self.to_bits().encode(out);
    }
}

impl Decode for f32 {
    fn decode<S: InputStream + ?Sized>(input: &mut S) -> Result<Self, ExtractError> {
        Ok(f32::from_bits(u32::decode(input)?))
    }
}

impl Encode for f64 {
    fn encode<S: OutputStream + ?Sized>(&self, out: &mut S) {
        self.to_bits().encode(out);
    }
}

impl Decode for f64 {
    fn decode<S: InputStream + ?Sized>(input: &mut S) -> Result<Self, ExtractError> {
        Ok(f64::from_bits(u64::decode(input)?))
    }
}

/// Longest byte sequence a `u32` length prefix can describe.
pub const MAX_SEQUENCE_LEN: usize = u32::MAX as usize;

/// Prefix actually written for a sequence of `len` bytes.
fn wire_len(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Sequences longer than [`MAX_SEQUENCE_LEN`] are cut to that length so the
/// prefix always matches the bytes that follow it.
impl Encode for [u8] {
    fn encode<S: OutputStream + ?Sized>(&self, out: &mut S) {
        debug_assert!(
            self.len() <= MAX_SEQUENCE_LEN,
            "sequence of {} bytes exceeds the wire limit",
            self.len()
        );
        let len = wire_len(self.len());
        len.encode(out);
        out.write_bytes(&self[..len as usize]);
    }
}

impl Encode for Vec<u8> {
    fn encode<S: OutputStream + ?Sized>(&self, out: &mut S) {
        self.as_slice().encode(out);
    }
}

impl Decode for Vec<u8> {
    fn decode<S: InputStream + ?Sized>(input: &mut S) -> Result<Self, ExtractError> {
        let len = u32::decode(input)? as usize;
        input.read_vec(len)
    }
}

impl Encode for str {
    fn encode<S: OutputStream + ?Sized>(&self, out: &mut S) {
        self.as_bytes().encode(out);
    }
}

impl Encode for String {
    fn encode<S: OutputStream + ?Sized>(&self, out: &mut S) {
        self.as_str().encode(out);
    }
}

impl Decode for String {
    fn decode<S: InputStream + ?Sized>(input: &mut S) -> Result<Self, ExtractError> {
        let bytes = Vec::<u8>::decode(input)?;
        String::from_utf8(bytes).map_err(|_| {
            input.set_read_error();
            ExtractError::InvalidUtf8
        })
    }
}

impl Encode for Packet {
    fn encode<S: OutputStream + ?Sized>(&self, out: &mut S) {
        self.as_bytes().encode(out);
    }
}

impl Decode for Packet {
    fn decode<S: InputStream + ?Sized>(input: &mut S) -> Result<Self, ExtractError> {
        Ok(Packet::from(Vec::<u8>::decode(input)?))
    }
}

impl Encode for () {
    fn encode<S: OutputStream + ?Sized>(&self, _out: &mut S) {}
}

impl Decode for () {
    fn decode<S: InputStream + ?Sized>(_input: &mut S) -> Result<Self, ExtractError> {
        Ok(())
    }
}

macro_rules! impl_tuple_codec {
    ($($name:ident)+) => {
        impl<$($name: Encode),+> Encode for ($($name,)+) {
            #[allow(non_snake_case)]
            fn encode<S: OutputStream + ?Sized>(&self, out: &mut S) {
                let ($($name,)+) = self;
                $($name.encode(out);)+
            }
        }

        impl<$($name: Decode),+> Decode for ($($name,)+) {
            fn decode<S: InputStream + ?Sized>(input: &mut S) -> Result<Self, ExtractError> {
                Ok(($($name::decode(input)?,)+))
            }
        }
    };
}

impl_tuple_codec!(A);
impl_tuple_codec!(A B);
impl_tuple_codec!(A B C);
impl_tuple_codec!(A B C D);
impl_tuple_codec!(A B C D E);
impl_tuple_codec!(A B C D E F);
impl_tuple_codec!(A B C D E F G);
impl_tuple_codec!(A B C D E F G H);
impl_tuple_codec!(A B C D E F G H I);
impl_tuple_codec!(A B C D E F G H I J);
impl_tuple_codec!(A B C D E F G H I J K);
impl_tuple_codec!(A B C D E F G H I J K L);
