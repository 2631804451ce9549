/// Value family of a logged argument.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    Signed = 1,
    Unsigned,
    Float,
    Char,
    Str,
    Pointer,
}

impl ArgKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        let kind = match value {
            1 => ArgKind::Signed,
            2 => ArgKind::Unsigned,
            3 => ArgKind::Float,
            4 => ArgKind::Char,
            5 => ArgKind::Str,
            6 => ArgKind::Pointer,
            _ => return None,
        };
        Some(kind)
    }
}

/// A value that can be queued as a log argument.
///
/// Every argument travels as a blob: [`encoded_len`](Loggable::encoded_len)
/// bytes written by [`encode`](Loggable::encode), preceded on the wire by a
/// 4-byte length prefix added by the codec. Scalars are little-endian and
/// their blob length is what the decoder uses to check them against the
/// conversion's argument type:
///
/// | Rust type | Blob | Conversions |
/// |---|---|---|
/// | `i8`/`u8` | 1 byte | `%hhd` `%hhu` `%hhx` |
/// | `i16`/`u16` | 2 bytes | `%hd` `%hu` |
/// | `i32`/`u32`/`bool`/`char` | 4 bytes | `%d` `%u` `%x` `%c` `%lc` |
/// | `i64`/`u64` | 8 bytes | `%ld` `%lld` `%lu` `%jd` |
/// | `isize`/`usize`/pointers | word | `%zd` `%zu` `%td` `%p` |
/// | `f32`/`f64` | 8 bytes | `%f` `%e` `%g` `%a` `%Lf` |
/// | `str`/`String` | UTF-8 bytes | `%s` `%ls` |
///
/// [`kind`](Loggable::kind) tells the registry and the decoder which family of
/// conversions may consume the value: a string never feeds `%d`, an integer
/// never feeds `%s` or `%f`.
pub trait Loggable {
    fn kind(&self) -> ArgKind;

    fn encoded_len(&self) -> usize;

    /// Writes exactly `encoded_len()` bytes into `buf`.
    fn encode(&self, buf: &mut [u8]);
}

macro_rules! impl_loggable_scalar {
    ($kind:ident: $($t:ty),*) => {
        $(
            impl Loggable for $t {
                #[inline]
                fn kind(&self) -> ArgKind {
                    ArgKind::$kind
                }

                #[inline]
                fn encoded_len(&self) -> usize {
                    std::mem::size_of::<$t>()
                }

                #[inline]
                fn encode(&self, buf: &mut [u8]) {
                    buf[..std::mem::size_of::<$t>()].copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_loggable_scalar!(Signed: i8, i16, i32, i64, isize);
impl_loggable_scalar!(Unsigned: u8, u16, u32, u64, usize);
impl_loggable_scalar!(Float: f64);

impl Loggable for f32 {
    #[inline]
    fn kind(&self) -> ArgKind {
        ArgKind::Float
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        8
    }

    #[inline]
    fn encode(&self, buf: &mut [u8]) {
        f64::from(*self).encode(buf)
    }
}

impl Loggable for bool {
    #[inline]
    fn kind(&self) -> ArgKind {
        ArgKind::Signed
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        4
    }

    #[inline]
    fn encode(&self, buf: &mut [u8]) {
        i32::from(*self).encode(buf)
    }
}

impl Loggable for char {
    #[inline]
    fn kind(&self) -> ArgKind {
        ArgKind::Char
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        4
    }

    #[inline]
    fn encode(&self, buf: &mut [u8]) {
        u32::from(*self).encode(buf)
    }
}

impl Loggable for str {
    #[inline]
    fn kind(&self) -> ArgKind {
        ArgKind::Str
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        self.len()
    }

    #[inline]
    fn encode(&self, buf: &mut [u8]) {
        buf[..self.len()].copy_from_slice(self.as_bytes());
    }
}

impl Loggable for String {
    #[inline]
    fn kind(&self) -> ArgKind {
        ArgKind::Str
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        self.as_str().encoded_len()
    }

    #[inline]
    fn encode(&self, buf: &mut [u8]) {
        self.as_str().encode(buf)
    }
}

impl<T: Loggable + ?Sized> Loggable for &T {
    #[inline]
    fn kind(&self) -> ArgKind {
        (**self).kind()
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        (**self).encoded_len()
    }

    #[inline]
    fn encode(&self, buf: &mut [u8]) {
        (**self).encode(buf)
    }
}

impl<T: ?Sized> Loggable for *const T {
    #[inline]
    fn kind(&self) -> ArgKind {
        ArgKind::Pointer
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        std::mem::size_of::<usize>()
    }

    #[inline]
    fn encode(&self, buf: &mut [u8]) {
        (self.cast::<()>() as usize).encode(buf)
    }
}

impl<T: ?Sized> Loggable for *mut T {
    #[inline]
    fn kind(&self) -> ArgKind {
        ArgKind::Pointer
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        std::mem::size_of::<usize>()
    }

    #[inline]
    fn encode(&self, buf: &mut [u8]) {
        (self.cast::<()>() as usize).encode(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded<T: Loggable + ?Sized>(value: &T) -> Vec<u8> {
        let mut buf = vec![0u8; value.encoded_len()];
        value.encode(&mut buf);
        buf
    }

    #[test]
    fn test_numeric_encoding() {
        assert_eq!(encoded(&12345i32), 12345i32.to_le_bytes());
        assert_eq!(encoded(&-1i8), [0xff]);
        assert_eq!(encoded(&3.5f64), 3.5f64.to_le_bytes());
        assert_eq!(encoded(&usize::MAX).len(), std::mem::size_of::<usize>());
    }

    #[test]
    fn test_promotions() {
        assert_eq!(encoded(&1.5f32), 1.5f64.to_le_bytes());
        assert_eq!(encoded(&true), 1i32.to_le_bytes());
        assert_eq!(encoded(&'A'), 65u32.to_le_bytes());
    }

    #[test]
    fn test_string_encoding() {
        assert_eq!(encoded("Hello"), b"Hello");
        assert_eq!(encoded(&String::from("héllo")), "héllo".as_bytes());
        assert_eq!(encoded(&&"nested"), b"nested");
        assert!(encoded("").is_empty());
    }

    #[test]
    fn test_kinds() {
        assert_eq!((-1i8).kind(), ArgKind::Signed);
        assert_eq!(true.kind(), ArgKind::Signed);
        assert_eq!(7usize.kind(), ArgKind::Unsigned);
        assert_eq!(1.5f32.kind(), ArgKind::Float);
        assert_eq!('x'.kind(), ArgKind::Char);
        assert_eq!((&&"nested").kind(), ArgKind::Str);
        assert_eq!(std::ptr::null::<u8>().kind(), ArgKind::Pointer);
        for kind in [ArgKind::Signed, ArgKind::Str, ArgKind::Pointer] {
            assert_eq!(ArgKind::from_u8(kind as u8), Some(kind));
        }
        assert_eq!(ArgKind::from_u8(0), None);
    }

    #[test]
    fn test_pointer_encoding() {
        let value = 7u32;
        let ptr: *const u32 = &value;
        assert_eq!(encoded(&ptr), (ptr as usize).to_le_bytes());
        let null: *mut u8 = std::ptr::null_mut();
        assert_eq!(encoded(&null), 0usize.to_le_bytes());
    }
}
