//! Built-in archivable types

use super::{
    load_bulk, load_len, load_trivial, load_tuple, store_bulk, store_sequence_len, store_trivial,
    store_tuple, wrap_load, wrap_store, Archivable, InputArchive, OutputArchive, Sequence,
    TriviallyCodable, Tuple,
};
use crate::core::error::{CloudError, Result};
use crate::core::registry::{STRING_COOKIE, UNREGISTERED};
use num_complex::Complex;
use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};

macro_rules! trivially_codable {
    ($($ty:ty => $cookie:expr, $vec_cookie:expr;)*) => {$(
        impl TriviallyCodable for $ty {
            const WIDTH: usize = std::mem::size_of::<$ty>();

            fn encode_into(&self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_le_bytes());
            }

            fn decode_from(bytes: &[u8]) -> Result<Self> {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                Ok(<$ty>::from_le_bytes(raw))
            }
        }

        impl Archivable for $ty {
            const COOKIE: u8 = $cookie;
            const VEC_COOKIE: u8 = $vec_cookie;

            fn store_payload<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()> {
                store_trivial(self, ar)
            }

            fn load_payload<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
                *self = load_trivial(ar)?;
                Ok(())
            }

            fn store_array<A: OutputArchive + ?Sized>(items: &[Self], ar: &mut A) -> Result<()> {
                store_bulk(items, ar)
            }

            fn load_array<A: InputArchive + ?Sized>(items: &mut [Self], ar: &mut A) -> Result<()> {
                load_bulk(items, ar)
            }
        }
    )*};
}

trivially_codable! {
    u8 => 0, 21;
    u16 => 1, 23;
    u32 => 2, 25;
    u64 => 3, 27;
    u128 => 4, UNREGISTERED;
    i8 => 5, 20;
    i16 => 6, 22;
    i32 => 7, 24;
    i64 => 8, 26;
    i128 => 9, UNREGISTERED;
    f32 => 11, 29;
    f64 => 12, 30;
}

/// Fixed-width stand-ins for types whose in-memory layout is not portable
macro_rules! widened_codable {
    ($($ty:ty as $wide:ty => $cookie:expr;)*) => {$(
        impl TriviallyCodable for $ty {
            const WIDTH: usize = std::mem::size_of::<$wide>();

            fn encode_into(&self, out: &mut [u8]) {
                out.copy_from_slice(&(*self as $wide).to_le_bytes());
            }

            fn decode_from(bytes: &[u8]) -> Result<Self> {
                let mut raw = [0u8; std::mem::size_of::<$wide>()];
                raw.copy_from_slice(bytes);
                let wide = <$wide>::from_le_bytes(raw);
                <$ty>::try_from(wide).map_err(|_| {
                    CloudError::InvalidValue(format!(
                        "{} does not fit in {}",
                        wide,
                        stringify!($ty)
                    ))
                })
            }
        }

        impl Archivable for $ty {
            const COOKIE: u8 = $cookie;

            fn store_payload<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()> {
                store_trivial(self, ar)
            }

            fn load_payload<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
                *self = load_trivial(ar)?;
                Ok(())
            }

            fn store_array<A: OutputArchive + ?Sized>(items: &[Self], ar: &mut A) -> Result<()> {
                store_bulk(items, ar)
            }

            fn load_array<A: InputArchive + ?Sized>(items: &mut [Self], ar: &mut A) -> Result<()> {
                load_bulk(items, ar)
            }
        }
    )*};
}

widened_codable! {
    usize as u64 => 16;
    isize as i64 => 17;
}

/// Real part, then imaginary part
macro_rules! complex_codable {
    ($($part:ty => $cookie:expr;)*) => {$(
        impl TriviallyCodable for Complex<$part> {
            const WIDTH: usize = 2 * std::mem::size_of::<$part>();

            fn encode_into(&self, out: &mut [u8]) {
                let (re, im) = out.split_at_mut(std::mem::size_of::<$part>());
                re.copy_from_slice(&self.re.to_le_bytes());
                im.copy_from_slice(&self.im.to_le_bytes());
            }

            fn decode_from(bytes: &[u8]) -> Result<Self> {
                let mut re = [0u8; std::mem::size_of::<$part>()];
                let mut im = [0u8; std::mem::size_of::<$part>()];
                let n = re.len();
                re.copy_from_slice(&bytes[..n]);
                im.copy_from_slice(&bytes[n..]);
                Ok(Complex::new(<$part>::from_le_bytes(re), <$part>::from_le_bytes(im)))
            }
        }

        impl Archivable for Complex<$part> {
            const COOKIE: u8 = $cookie;

            fn store_payload<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()> {
                store_trivial(self, ar)
            }

            fn load_payload<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
                *self = load_trivial(ar)?;
                Ok(())
            }

            fn store_array<A: OutputArchive + ?Sized>(items: &[Self], ar: &mut A) -> Result<()> {
                store_bulk(items, ar)
            }

            fn load_array<A: InputArchive + ?Sized>(items: &mut [Self], ar: &mut A) -> Result<()> {
                load_bulk(items, ar)
            }
        }
    )*};
}

complex_codable! {
    f32 => 14;
    f64 => 15;
}

impl TriviallyCodable for bool {
    const WIDTH: usize = 1;

    fn encode_into(&self, out: &mut [u8]) {
        out[0] = u8::from(*self);
    }

    fn decode_from(bytes: &[u8]) -> Result<Self> {
        match bytes[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CloudError::InvalidValue(format!("{} is not a bool", other))),
        }
    }
}

impl Archivable for bool {
    const COOKIE: u8 = 10;
    const VEC_COOKIE: u8 = 28;

    fn store_payload<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()> {
        store_trivial(self, ar)
    }

    fn load_payload<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        *self = load_trivial(ar)?;
        Ok(())
    }

    fn store_array<A: OutputArchive + ?Sized>(items: &[Self], ar: &mut A) -> Result<()> {
        store_bulk(items, ar)
    }

    fn load_array<A: InputArchive + ?Sized>(items: &mut [Self], ar: &mut A) -> Result<()> {
        load_bulk(items, ar)
    }
}

impl TriviallyCodable for char {
    const WIDTH: usize = 4;

    fn encode_into(&self, out: &mut [u8]) {
        out.copy_from_slice(&u32::from(*self).to_le_bytes());
    }

    fn decode_from(bytes: &[u8]) -> Result<Self> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        let code = u32::from_le_bytes(raw);
        char::from_u32(code)
            .ok_or_else(|| CloudError::InvalidValue(format!("{:#x} is not a char", code)))
    }
}

impl Archivable for char {
    const COOKIE: u8 = 18;

    fn store_payload<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()> {
        store_trivial(self, ar)
    }

    fn load_payload<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        *self = load_trivial(ar)?;
        Ok(())
    }

    fn store_array<A: OutputArchive + ?Sized>(items: &[Self], ar: &mut A) -> Result<()> {
        store_bulk(items, ar)
    }

    fn load_array<A: InputArchive + ?Sized>(items: &mut [Self], ar: &mut A) -> Result<()> {
        load_bulk(items, ar)
    }
}

impl Archivable for String {
    const COOKIE: u8 = STRING_COOKIE;

    fn store_payload<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()> {
        store_sequence_len(ar, self)?;
        u8::store_array(self.as_bytes(), ar)
    }

    fn load_payload<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        let len = load_len(ar)?;
        let mut bytes = vec![0u8; len];
        u8::load_array(&mut bytes, ar)?;
        *self = String::from_utf8(bytes)
            .map_err(|e| CloudError::InvalidValue(format!("string is not UTF-8: {}", e)))?;
        Ok(())
    }
}

impl Sequence for String {
    fn element_count(&self) -> usize {
        self.len()
    }
}

/// Loading resizes the target to the stored length, discarding its contents
/// whenever the lengths differ.
impl<T: Archivable + Default> Archivable for Vec<T> {
    const COOKIE: u8 = T::VEC_COOKIE;

    fn store_payload<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()> {
        store_sequence_len(ar, self)?;
        T::store_array(self, ar)
    }

    fn load_payload<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        let len = load_len(ar)?;
        if len != self.element_count() {
            self.clear();
            self.resize_with(len, T::default);
        }
        T::load_array(self, ar)
    }
}

impl<T> Sequence for Vec<T> {
    fn element_count(&self) -> usize {
        self.len()
    }
}

/// The stored length must equal `N`.
impl<T: Archivable, const N: usize> Archivable for [T; N] {
    fn store_payload<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()> {
        store_sequence_len(ar, self)?;
        T::store_array(self, ar)
    }

    fn load_payload<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        let len = load_len(ar)?;
        if len != self.element_count() {
            return Err(CloudError::SizeMismatch {
                expected: N,
                found: len,
            });
        }
        T::load_array(self, ar)
    }
}

impl<T, const N: usize> Sequence for [T; N] {
    fn element_count(&self) -> usize {
        N
    }
}

impl<T: Archivable + Default> Archivable for Option<T> {
    fn store_payload<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()> {
        wrap_store(ar, &self.is_some())?;
        match self {
            Some(value) => wrap_store(ar, value),
            None => Ok(()),
        }
    }

    fn load_payload<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        let mut present = false;
        wrap_load(ar, &mut present)?;
        if present {
            wrap_load(ar, self.get_or_insert_with(T::default))
        } else {
            *self = None;
            Ok(())
        }
    }
}

impl<T: Archivable> Archivable for Box<T> {
    const COOKIE: u8 = T::COOKIE;

    fn store_payload<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()> {
        (**self).store_payload(ar)
    }

    fn load_payload<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        (**self).load_payload(ar)
    }
}

fn store_entry<K, V, A>(ar: &mut A, key: &K, value: &V) -> Result<()>
where
    K: Archivable,
    V: Archivable,
    A: OutputArchive + ?Sized,
{
    ar.store_bytes(&[<(K, V) as Archivable>::COOKIE])?;
    wrap_store(ar, key)?;
    wrap_store(ar, value)
}

fn load_entry<K, V, A>(ar: &mut A) -> Result<(K, V)>
where
    K: Archivable + Default,
    V: Archivable + Default,
    A: InputArchive + ?Sized,
{
    let mut entry = (K::default(), V::default());
    wrap_load(ar, &mut entry)?;
    Ok(entry)
}

/// Loading merges into the target: stored keys overwrite or insert, keys
/// already present but absent from the archive are kept.
impl<K, V> Archivable for BTreeMap<K, V>
where
    K: Archivable + Default + Ord,
    V: Archivable + Default,
{
    fn store_payload<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()> {
        store_sequence_len(ar, self)?;
        for (key, value) in self {
            store_entry(ar, key, value)?;
        }
        Ok(())
    }

    fn load_payload<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        let len = load_len(ar)?;
        for _ in 0..len {
            let (key, value) = load_entry::<K, V, A>(ar)?;
            self.insert(key, value);
        }
        Ok(())
    }
}

impl<K, V> Sequence for BTreeMap<K, V> {
    fn element_count(&self) -> usize {
        self.len()
    }
}

/// Same merge semantics as `BTreeMap`. Entry order follows the hasher.
impl<K, V, S> Archivable for HashMap<K, V, S>
where
    K: Archivable + Default + Eq + Hash,
    V: Archivable + Default,
    S: BuildHasher + Default,
{
    fn store_payload<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()> {
        store_sequence_len(ar, self)?;
        for (key, value) in self {
            store_entry(ar, key, value)?;
        }
        Ok(())
    }

    fn load_payload<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        let len = load_len(ar)?;
        for _ in 0..len {
            let (key, value) = load_entry::<K, V, A>(ar)?;
            self.insert(key, value);
        }
        Ok(())
    }
}

impl<K, V, S> Sequence for HashMap<K, V, S> {
    fn element_count(&self) -> usize {
        self.len()
    }
}

macro_rules! tuple_archivable {
    ($arity:expr; $($name:ident $idx:tt),+) => {
        impl<$($name: Archivable),+> Tuple for ($($name,)+) {
            const ARITY: usize = $arity;

            fn store_elements<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()> {
                $( wrap_store(ar, &self.$idx)?; )+
                Ok(())
            }

            fn load_elements<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
                $( wrap_load(ar, &mut self.$idx)?; )+
                Ok(())
            }
        }

        impl<$($name: Archivable),+> Archivable for ($($name,)+) {
            fn store_payload<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()> {
                store_tuple(self, ar)
            }

            fn load_payload<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
                load_tuple(self, ar)
            }
        }
    };
}

tuple_archivable!(1; T0 0);
tuple_archivable!(2; T0 0, T1 1);
tuple_archivable!(3; T0 0, T1 1, T2 2);
tuple_archivable!(4; T0 0, T1 1, T2 2, T3 3);
tuple_archivable!(5; T0 0, T1 1, T2 2, T3 3, T4 4);
tuple_archivable!(6; T0 0, T1 1, T2 2, T3 3, T4 4, T5 5);
tuple_archivable!(7; T0 0, T1 1, T2 2, T3 3, T4 4, T5 5, T6 6);
tuple_archivable!(8; T0 0, T1 1, T2 2, T3 3, T4 4, T5 5, T6 6, T7 7);
