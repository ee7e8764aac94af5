//! Process-wide type registry
//!
//! Maps the one-byte cookies written in front of every archived value to
//! human-readable type names, and holds the table of named callables that
//! replaces raw function addresses on the wire.
//!
//! The registry is built exactly once per process, either by an explicit
//! startup routine ([`initialize_with`]) or lazily with the built-in types
//! only ([`registry`]). It is read-only afterwards.
//!
//! ## Cookie layout
//!
//! ```text
//! 0..=63     built-in types
//! 64..=127   bulk arrays of built-in types (cookie + 64)
//! 128..=190  extension types
//! 192..=254  bulk arrays of extension types (cookie + 64)
//! 255        unregistered
//! ```

use crate::core::archive::Archivable;
use crate::core::error::{CloudError, Result};
use crate::core::recordlist::Recordlist;
use crate::core::tensor::Tensor;
use ahash::AHashMap;
use num_complex::Complex;
use std::any::{Any, TypeId};
use std::sync::OnceLock;
use tracing::warn;

/// Cookie of types that were never registered
pub const UNREGISTERED: u8 = 255;

/// First cookie available to extension types
pub const EXTENSION_FIRST: u8 = 128;

/// Last cookie available to extension types
pub const EXTENSION_LAST: u8 = 190;

/// Name reported for empty slots
pub const INVALID_NAME: &str = "invalid";

pub const CALLABLE_COOKIE: u8 = 19;
pub const STRING_COOKIE: u8 = 31;
pub const OBJECT_REF_COOKIE: u8 = 40;
pub const RECORDLIST_COOKIE: u8 = 41;

/// Cookie used in front of a bulk array of values with cookie `cookie`
pub const fn array_cookie(cookie: u8) -> u8 {
    match cookie {
        0..=63 | EXTENSION_FIRST..=EXTENSION_LAST => cookie + 64,
        _ => UNREGISTERED,
    }
}

struct CallableEntry {
    type_id: TypeId,
    type_name: &'static str,
    value: Box<dyn Any + Send + Sync>,
}

/// Read-only cookie → name table plus named callables
pub struct TypeRegistry {
    names: Vec<Option<String>>,
    callables: AHashMap<String, CallableEntry>,
}

impl TypeRegistry {
    /// Registered name of `cookie`, or `"invalid"` for an empty slot
    pub fn name_of(&self, cookie: u8) -> &str {
        self.names[cookie as usize]
            .as_deref()
            .unwrap_or(INVALID_NAME)
    }

    pub fn is_bound(&self, cookie: u8) -> bool {
        self.names[cookie as usize].is_some()
    }

    /// All bound slots in cookie order
    pub fn entries(&self) -> Vec<(u8, &str)> {
        self.names
            .iter()
            .enumerate()
            .filter_map(|(cookie, name)| name.as_deref().map(|n| (cookie as u8, n)))
            .collect()
    }

    /// Names of all registered callables, sorted
    pub fn callable_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.callables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve a named callable with signature `F`
    pub fn callable<F: Copy + Send + Sync + 'static>(&self, name: &str) -> Result<F> {
        let entry = self
            .callables
            .get(name)
            .ok_or_else(|| CloudError::UnknownCallable(name.to_string()))?;

        entry
            .value
            .downcast_ref::<F>()
            .copied()
            .ok_or_else(|| CloudError::CallableSignatureMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<F>(),
            })
    }

    /// True if every binding of `other` is also present here
    fn covers(&self, other: &TypeRegistry) -> bool {
        let names_ok = self
            .names
            .iter()
            .zip(other.names.iter())
            .all(|(mine, theirs)| theirs.is_none() || mine == theirs);

        let callables_ok = other.callables.iter().all(|(name, entry)| {
            self.callables
                .get(name)
                .is_some_and(|mine| mine.type_id == entry.type_id)
        });

        names_ok && callables_ok
    }
}

/// Builder for the process registry
///
/// Starts with all built-in types bound. Extension types and callables are
/// added by the startup routine passed to [`initialize_with`], or by tests
/// that need a private registry.
pub struct RegistryBuilder {
    names: Vec<Option<String>>,
    callables: AHashMap<String, CallableEntry>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    /// Builder with the built-in types already bound
    pub fn new() -> Self {
        let mut builder = RegistryBuilder {
            names: vec![None; 256],
            callables: AHashMap::new(),
        };
        builder.bind_builtins();
        builder
    }

    fn bind_builtins(&mut self) {
        self.builtin::<u8>();
        self.builtin::<u16>();
        self.builtin::<u32>();
        self.builtin::<u64>();
        self.builtin::<u128>();
        self.builtin::<i8>();
        self.builtin::<i16>();
        self.builtin::<i32>();
        self.builtin::<i64>();
        self.builtin::<i128>();
        self.builtin::<bool>();
        self.builtin::<f32>();
        self.builtin::<f64>();
        self.builtin::<Complex<f32>>();
        self.builtin::<Complex<f64>>();
        self.builtin::<usize>();
        self.builtin::<isize>();
        self.builtin::<char>();

        self.builtin::<Vec<i8>>();
        self.builtin::<Vec<u8>>();
        self.builtin::<Vec<i16>>();
        self.builtin::<Vec<u16>>();
        self.builtin::<Vec<i32>>();
        self.builtin::<Vec<u32>>();
        self.builtin::<Vec<i64>>();
        self.builtin::<Vec<u64>>();
        self.builtin::<Vec<bool>>();
        self.builtin::<Vec<f32>>();
        self.builtin::<Vec<f64>>();
        self.builtin::<String>();

        self.builtin::<Tensor<i32>>();
        self.builtin::<Tensor<i64>>();
        self.builtin::<Tensor<f32>>();
        self.builtin::<Tensor<f64>>();
        self.builtin::<Tensor<Complex<f32>>>();
        self.builtin::<Tensor<Complex<f64>>>();

        self.names[CALLABLE_COOKIE as usize] = Some("callable".to_string());
        self.names[OBJECT_REF_COOKIE as usize] = Some("object-ref".to_string());
        self.names[RECORDLIST_COOKIE as usize] = Some(std::any::type_name::<Recordlist>().to_string());
    }

    fn builtin<T: Archivable>(&mut self) {
        let name = std::any::type_name::<T>();
        self.names[T::COOKIE as usize] = Some(name.to_string());
        let array = array_cookie(T::COOKIE);
        if array != UNREGISTERED {
            self.names[array as usize] = Some(format!("[{}]", name));
        }
    }

    fn bind(&mut self, cookie: u8, name: String) -> Result<()> {
        match &self.names[cookie as usize] {
            Some(existing) if *existing != name => {
                warn!(
                    "Cookie {} already in use by {}, refusing {}",
                    cookie, existing, name
                );
                Err(CloudError::RegistryConflict {
                    cookie,
                    existing: existing.clone(),
                    attempted: name,
                })
            }
            _ => {
                self.names[cookie as usize] = Some(name);
                Ok(())
            }
        }
    }

    /// Bind an extension type under its cookie (and its bulk-array cookie)
    ///
    /// # Errors
    ///
    /// `InvalidExtensionCookie` if the cookie lies outside `128..=190`,
    /// `RegistryConflict` if the slot already names a different type.
    pub fn register<T: Archivable>(&mut self) -> Result<&mut Self> {
        let name = std::any::type_name::<T>();
        if !(EXTENSION_FIRST..=EXTENSION_LAST).contains(&T::COOKIE) {
            return Err(CloudError::InvalidExtensionCookie {
                cookie: T::COOKIE,
                type_name: name.to_string(),
            });
        }

        self.bind(T::COOKIE, name.to_string())?;
        self.bind(array_cookie(T::COOKIE), format!("[{}]", name))?;
        Ok(self)
    }

    /// Add a named callable; names are unique
    pub fn callable<F: Copy + Send + Sync + 'static>(
        &mut self,
        name: &str,
        function: F,
    ) -> Result<&mut Self> {
        if let Some(existing) = self.callables.get(name) {
            return Err(CloudError::Config(format!(
                "callable '{}' already registered as {}",
                name, existing.type_name
            )));
        }

        self.callables.insert(
            name.to_string(),
            CallableEntry {
                type_id: TypeId::of::<F>(),
                type_name: std::any::type_name::<F>(),
                value: Box::new(function),
            },
        );
        Ok(self)
    }

    pub fn build(self) -> TypeRegistry {
        TypeRegistry {
            names: self.names,
            callables: self.callables,
        }
    }
}

static REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();

/// Run the startup routine and install the process registry
///
/// Calling this again is harmless as long as the routine only adds bindings
/// the installed registry already has; otherwise a `Config` error is
/// returned and the installed registry is left untouched.
pub fn initialize_with<F>(extend: F) -> Result<&'static TypeRegistry>
where
    F: FnOnce(&mut RegistryBuilder) -> Result<()>,
{
    let mut builder = RegistryBuilder::new();
    extend(&mut builder)?;
    let candidate = builder.build();

    match REGISTRY.set(candidate) {
        Ok(()) => Ok(registry()),
        Err(candidate) => {
            let installed = registry();
            if installed.covers(&candidate) {
                Ok(installed)
            } else {
                Err(CloudError::Config(
                    "type registry already initialized with different bindings".to_string(),
                ))
            }
        }
    }
}

/// The process registry, built with the built-in types on first use
pub fn registry() -> &'static TypeRegistry {
    REGISTRY.get_or_init(|| RegistryBuilder::new().build())
}

/// Registered name of `cookie` in the process registry
pub fn name_of(cookie: u8) -> &'static str {
    registry().name_of(cookie)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::archive::{InputArchive, OutputArchive};

    #[derive(Default)]
    struct Gauge(u32);

    impl Archivable for Gauge {
        const COOKIE: u8 = 150;

        fn store_payload<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()> {
            self.0.store_payload(ar)
        }

        fn load_payload<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
            self.0.load_payload(ar)
        }
    }

    #[derive(Default)]
    struct Clash;

    impl Archivable for Clash {
        const COOKIE: u8 = 150;

        fn store_payload<A: OutputArchive + ?Sized>(&self, _ar: &mut A) -> Result<()> {
            Ok(())
        }

        fn load_payload<A: InputArchive + ?Sized>(&mut self, _ar: &mut A) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Squatter;

    impl Archivable for Squatter {
        const COOKIE: u8 = 12;

        fn store_payload<A: OutputArchive + ?Sized>(&self, _ar: &mut A) -> Result<()> {
            Ok(())
        }

        fn load_payload<A: InputArchive + ?Sized>(&mut self, _ar: &mut A) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_builtin_names() {
        let reg = RegistryBuilder::new().build();
        assert_eq!(reg.name_of(12), "f64");
        assert_eq!(reg.name_of(7), "i32");
        assert_eq!(reg.name_of(array_cookie(12)), "[f64]");
        assert_eq!(reg.name_of(200), INVALID_NAME);
        assert_eq!(reg.name_of(UNREGISTERED), INVALID_NAME);
    }

    #[test]
    fn test_complex_builtins() {
        let reg = RegistryBuilder::new().build();
        assert!(reg.name_of(14).contains("Complex<f32>"));
        assert!(reg.name_of(15).contains("Complex<f64>"));
        assert!(reg.name_of(78).starts_with('['));
        assert!(reg.name_of(36).contains("Complex<f32>"));
        assert!(reg.name_of(37).contains("Complex<f64>"));
    }

    #[test]
    fn test_array_cookie_ranges() {
        assert_eq!(array_cookie(0), 64);
        assert_eq!(array_cookie(63), 127);
        assert_eq!(array_cookie(128), 192);
        assert_eq!(array_cookie(190), 254);
        assert_eq!(array_cookie(64), UNREGISTERED);
        assert_eq!(array_cookie(UNREGISTERED), UNREGISTERED);
    }

    #[test]
    fn test_register_extension_is_idempotent() {
        let mut builder = RegistryBuilder::new();
        builder.register::<Gauge>().unwrap();
        builder.register::<Gauge>().unwrap();
        let reg = builder.build();
        assert!(reg.name_of(150).ends_with("Gauge"));
        assert!(reg.name_of(214).ends_with("Gauge]"));
    }

    #[test]
    fn test_register_conflict() {
        let mut builder = RegistryBuilder::new();
        builder.register::<Gauge>().unwrap();
        match builder.register::<Clash>() {
            Err(CloudError::RegistryConflict { cookie, existing, attempted }) => {
                assert_eq!(cookie, 150);
                assert!(existing.ends_with("Gauge"));
                assert!(attempted.ends_with("Clash"));
            }
            _ => panic!("expected registry conflict"),
        }
    }

    #[test]
    fn test_register_outside_extension_range() {
        let mut builder = RegistryBuilder::new();
        assert!(matches!(
            builder.register::<Squatter>(),
            Err(CloudError::InvalidExtensionCookie { cookie: 12, .. })
        ));
    }

    #[test]
    fn test_callables() {
        fn double(x: f64) -> f64 {
            2.0 * x
        }

        let mut builder = RegistryBuilder::new();
        builder.callable::<fn(f64) -> f64>("double", double).unwrap();
        assert!(builder.callable::<fn(f64) -> f64>("double", double).is_err());
        let reg = builder.build();

        let f = reg.callable::<fn(f64) -> f64>("double").unwrap();
        assert_eq!(f(2.5), 5.0);
        assert!(matches!(
            reg.callable::<fn(f64) -> f64>("triple"),
            Err(CloudError::UnknownCallable(_))
        ));
        assert!(matches!(
            reg.callable::<fn(i32) -> i32>("double"),
            Err(CloudError::CallableSignatureMismatch { .. })
        ));
        assert_eq!(reg.callable_names(), vec!["double"]);
    }

    #[test]
    fn test_covers() {
        let base = RegistryBuilder::new().build();
        let mut extended = RegistryBuilder::new();
        extended.register::<Gauge>().unwrap();
        let extended = extended.build();

        assert!(extended.covers(&base));
        assert!(!base.covers(&extended));
    }
}
