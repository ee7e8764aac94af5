//! Archive framework
//!
//! An archive is a byte transport (`store_bytes` / `load_bytes`). Values move
//! through it via [`Archivable`], which every serializable type implements
//! using exactly one of four strategies, picked statically:
//!
//! 1. **Named callables** ([`NamedFn`](crate::core::callable::NamedFn)) travel
//!    as registered names, never as addresses.
//! 2. **Self-describing** types serialize their own fields, usually through
//!    [`archive_fields!`](crate::archive_fields) or by implementing
//!    [`SelfDescribing`] and invoking [`self_describing!`](crate::self_describing).
//! 3. **Trivially codable** types ([`TriviallyCodable`]) are moved in bulk:
//!    a slice of them is one byte transfer.
//! 4. Everything else (sequences, maps, tuples) recurses element-wise.
//!
//! A type offering none of these simply does not implement `Archivable`, so
//! using it is a compile error.
//!
//! Every value is *wrapped*: its cookie is written before the payload and
//! checked on the way back ([`wrap_store`] / [`wrap_load`]).
//!
//! ## Wire format
//!
//! ```text
//! value      := cookie:u8 payload
//! sequence   := wrapped(len:u64) elements
//! elements   := array_cookie:u8 bulk-bytes      (trivially codable)
//!             | value*                          (otherwise)
//! tuple      := 0xFF value_0 .. value_{n-1}
//! ```

pub mod buffer;
pub mod container;
pub mod file;
mod impls;

pub use buffer::{from_bytes, load_from_bytes, to_bytes, BufferInputArchive, BufferOutputArchive};
pub use container::{ContainerRecordInputArchive, ContainerRecordOutputArchive};
pub use file::{FileInputArchive, FileOutputArchive};

use crate::core::error::{CloudError, Result};
use crate::core::registry::{self, array_cookie, UNREGISTERED};
use crate::core::world::World;

/// Byte sink of an archive
pub trait OutputArchive {
    fn store_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    /// Execution context the archive is bound to, if any
    fn world(&self) -> Option<&dyn World> {
        None
    }
}

/// Byte source of an archive
pub trait InputArchive {
    /// Fill `buf` completely or fail
    fn load_bytes(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Bytes left, when the transport knows it
    fn remaining(&self) -> Option<usize> {
        None
    }

    /// Execution context the archive is bound to, if any
    fn world(&self) -> Option<&dyn World> {
        None
    }
}

impl<A: OutputArchive + ?Sized> OutputArchive for &mut A {
    fn store_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).store_bytes(bytes)
    }

    fn world(&self) -> Option<&dyn World> {
        (**self).world()
    }
}

impl<A: InputArchive + ?Sized> InputArchive for &mut A {
    fn load_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).load_bytes(buf)
    }

    fn remaining(&self) -> Option<usize> {
        (**self).remaining()
    }

    fn world(&self) -> Option<&dyn World> {
        (**self).world()
    }
}

/// A value that can be written to and read back from any archive
pub trait Archivable: Sized {
    /// Cookie written before the payload
    const COOKIE: u8 = UNREGISTERED;

    /// Cookie of `Vec<Self>`
    const VEC_COOKIE: u8 = UNREGISTERED;

    /// Write the payload (the cookie has already been written)
    fn store_payload<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()>;

    /// Read the payload into `self` (the cookie has already been checked)
    fn load_payload<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()>;

    /// Write a run of values; element-wise unless the type is trivially codable
    fn store_array<A: OutputArchive + ?Sized>(items: &[Self], ar: &mut A) -> Result<()> {
        for item in items {
            wrap_store(ar, item)?;
        }
        Ok(())
    }

    /// Read a run of values into `items`
    fn load_array<A: InputArchive + ?Sized>(items: &mut [Self], ar: &mut A) -> Result<()> {
        for item in items.iter_mut() {
            wrap_load(ar, item)?;
        }
        Ok(())
    }
}

/// Types with a fixed little-endian byte image, moved by bulk copy
pub trait TriviallyCodable: Archivable + Copy + Default {
    /// Encoded width in bytes
    const WIDTH: usize;

    /// Encode into exactly `WIDTH` bytes
    fn encode_into(&self, out: &mut [u8]);

    /// Decode from exactly `WIDTH` bytes
    fn decode_from(bytes: &[u8]) -> Result<Self>;
}

/// User-declared serialization
///
/// Implement the two directions by hand when they are not symmetric, then
/// make the type archivable with [`self_describing!`](crate::self_describing).
/// Symmetric field lists are better served by
/// [`archive_fields!`](crate::archive_fields).
pub trait SelfDescribing {
    fn store_fields<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()>;

    fn load_fields<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()>;
}

/// Length-prefixed collections
///
/// The element count is what goes in front of the elements on the wire.
pub trait Sequence {
    fn element_count(&self) -> usize;
}

/// Heterogeneous fixed-arity aggregates, serialized in declaration order
///
/// A tuple carries no length on the wire; the arity is part of its type.
pub trait Tuple {
    const ARITY: usize;

    /// Write elements `0..ARITY`, each wrapped
    fn store_elements<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()>;

    /// Read elements `0..ARITY`, each checked against its own cookie
    fn load_elements<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()>;
}

/// Write the cookie of `T`, then its payload
pub fn wrap_store<T, A>(ar: &mut A, value: &T) -> Result<()>
where
    T: Archivable,
    A: OutputArchive + ?Sized,
{
    ar.store_bytes(&[T::COOKIE])?;
    value.store_payload(ar)
}

/// Check the cookie of `T`, then read its payload into `value`
pub fn wrap_load<T, A>(ar: &mut A, value: &mut T) -> Result<()>
where
    T: Archivable,
    A: InputArchive + ?Sized,
{
    check_cookie(ar, T::COOKIE)?;
    value.load_payload(ar)
}

/// Read one value of type `T` into a fresh default instance
pub fn load_value<T, A>(ar: &mut A) -> Result<T>
where
    T: Archivable + Default,
    A: InputArchive + ?Sized,
{
    let mut value = T::default();
    wrap_load(ar, &mut value)?;
    Ok(value)
}

/// Read the next cookie without interpreting the payload behind it
pub fn load_cookie<A: InputArchive + ?Sized>(ar: &mut A) -> Result<u8> {
    let mut cookie = [0u8; 1];
    ar.load_bytes(&mut cookie)?;
    Ok(cookie[0])
}

pub(crate) fn check_cookie<A: InputArchive + ?Sized>(ar: &mut A, expected: u8) -> Result<()> {
    let found = load_cookie(ar)?;
    if found != expected {
        return Err(CloudError::TypeMismatch {
            expected,
            expected_name: registry::name_of(expected).to_string(),
            found,
            found_name: registry::name_of(found).to_string(),
        });
    }
    Ok(())
}

/// Write a sequence length
pub(crate) fn store_len<A: OutputArchive + ?Sized>(ar: &mut A, len: usize) -> Result<()> {
    wrap_store(ar, &(len as u64))
}

/// Write the length prefix of `seq`
pub(crate) fn store_sequence_len<S, A>(ar: &mut A, seq: &S) -> Result<()>
where
    S: Sequence + ?Sized,
    A: OutputArchive + ?Sized,
{
    store_len(ar, seq.element_count())
}

/// Payload of a tuple: its elements in order, no length
pub(crate) fn store_tuple<T, A>(value: &T, ar: &mut A) -> Result<()>
where
    T: Tuple,
    A: OutputArchive + ?Sized,
{
    value.store_elements(ar)
}

pub(crate) fn load_tuple<T, A>(value: &mut T, ar: &mut A) -> Result<()>
where
    T: Tuple,
    A: InputArchive + ?Sized,
{
    value.load_elements(ar)
}

/// Read a sequence length
///
/// Every element occupies at least one byte, so a length larger than what
/// the transport has left is rejected before anything gets allocated.
pub(crate) fn load_len<A: InputArchive + ?Sized>(ar: &mut A) -> Result<usize> {
    let mut raw = 0u64;
    wrap_load(ar, &mut raw)?;
    let len = usize::try_from(raw)
        .map_err(|_| CloudError::InvalidValue(format!("sequence length {} overflows", raw)))?;

    if let Some(available) = ar.remaining() {
        if len > available {
            return Err(CloudError::UnexpectedEof {
                needed: len,
                available,
            });
        }
    }
    Ok(len)
}

pub(crate) fn store_trivial<T, A>(value: &T, ar: &mut A) -> Result<()>
where
    T: TriviallyCodable,
    A: OutputArchive + ?Sized,
{
    let mut raw = [0u8; 16];
    let raw = &mut raw[..T::WIDTH];
    value.encode_into(raw);
    ar.store_bytes(raw)
}

pub(crate) fn load_trivial<T, A>(ar: &mut A) -> Result<T>
where
    T: TriviallyCodable,
    A: InputArchive + ?Sized,
{
    let mut raw = [0u8; 16];
    let raw = &mut raw[..T::WIDTH];
    ar.load_bytes(raw)?;
    T::decode_from(raw)
}

/// Bulk path: array cookie followed by one contiguous byte image
pub(crate) fn store_bulk<T, A>(items: &[T], ar: &mut A) -> Result<()>
where
    T: TriviallyCodable,
    A: OutputArchive + ?Sized,
{
    ar.store_bytes(&[array_cookie(T::COOKIE)])?;
    let mut bytes = vec![0u8; items.len() * T::WIDTH];
    for (chunk, item) in bytes.chunks_exact_mut(T::WIDTH).zip(items) {
        item.encode_into(chunk);
    }
    ar.store_bytes(&bytes)
}

pub(crate) fn load_bulk<T, A>(items: &mut [T], ar: &mut A) -> Result<()>
where
    T: TriviallyCodable,
    A: InputArchive + ?Sized,
{
    check_cookie(ar, array_cookie(T::COOKIE))?;
    let mut bytes = vec![0u8; items.len() * T::WIDTH];
    ar.load_bytes(&mut bytes)?;
    for (chunk, item) in bytes.chunks_exact(T::WIDTH).zip(items.iter_mut()) {
        *item = T::decode_from(chunk)?;
    }
    Ok(())
}

/// Implement [`Archivable`] for a struct from a list of its fields
///
/// Fields are written and read in the listed order, each wrapped with its own
/// cookie. An optional cookie for the struct itself goes after `=>`.
///
/// ```
/// use archive_cloud::{archive_fields, from_bytes, to_bytes};
///
/// #[derive(Debug, Default, PartialEq)]
/// struct Atom {
///     charge: f64,
///     symbol: String,
/// }
///
/// archive_fields!(Atom => 140 { charge, symbol });
///
/// let atom = Atom { charge: 8.0, symbol: "O".into() };
/// let bytes = to_bytes(&atom).unwrap();
/// assert_eq!(bytes[0], 140);
/// assert_eq!(from_bytes::<Atom>(&bytes).unwrap(), atom);
/// ```
#[macro_export]
macro_rules! archive_fields {
    ($ty:ty $(=> $cookie:tt)? { $($field:ident),* $(,)? }) => {
        impl $crate::Archivable for $ty {
            $(const COOKIE: u8 = $cookie;)?

            fn store_payload<A: $crate::OutputArchive + ?Sized>(
                &self,
                ar: &mut A,
            ) -> $crate::Result<()> {
                $( $crate::wrap_store(ar, &self.$field)?; )*
                let _ = ar;
                Ok(())
            }

            fn load_payload<A: $crate::InputArchive + ?Sized>(
                &mut self,
                ar: &mut A,
            ) -> $crate::Result<()> {
                $( $crate::wrap_load(ar, &mut self.$field)?; )*
                let _ = ar;
                Ok(())
            }
        }
    };
}

/// Implement [`Archivable`] for a [`SelfDescribing`] type
#[macro_export]
macro_rules! self_describing {
    ($ty:ty $(=> $cookie:expr)?) => {
        impl $crate::Archivable for $ty {
            $(const COOKIE: u8 = $cookie;)?

            fn store_payload<A: $crate::OutputArchive + ?Sized>(
                &self,
                ar: &mut A,
            ) -> $crate::Result<()> {
                $crate::SelfDescribing::store_fields(self, ar)
            }

            fn load_payload<A: $crate::InputArchive + ?Sized>(
                &mut self,
                ar: &mut A,
            ) -> $crate::Result<()> {
                $crate::SelfDescribing::load_fields(self, ar)
            }
        }
    };
}
