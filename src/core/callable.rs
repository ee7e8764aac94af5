//! Named callables
//!
//! Functions cannot cross a process boundary as addresses. Instead they are
//! registered under a name at startup (see
//! [`RegistryBuilder::callable`](crate::core::registry::RegistryBuilder::callable))
//! and a [`NamedFn`] carries only that name on the wire.

use crate::core::archive::{Archivable, InputArchive, OutputArchive};
use crate::core::error::Result;
use crate::core::registry::{self, CALLABLE_COOKIE};
use std::fmt;

/// A registered function of signature `F`, archived by name
#[derive(Clone)]
pub struct NamedFn<F> {
    name: String,
    function: Option<F>,
}

impl<F: Copy + Send + Sync + 'static> NamedFn<F> {
    /// Look `name` up in the process registry
    ///
    /// # Errors
    ///
    /// `UnknownCallable` if nothing is registered under `name`,
    /// `CallableSignatureMismatch` if it is registered with another signature.
    pub fn resolve(name: &str) -> Result<Self> {
        let function = registry::registry().callable::<F>(name)?;
        Ok(NamedFn {
            name: name.to_string(),
            function: Some(function),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The resolved function; `None` for the default, unnamed handle
    pub fn get(&self) -> Option<F> {
        self.function
    }
}

impl<F> Default for NamedFn<F> {
    fn default() -> Self {
        NamedFn {
            name: String::new(),
            function: None,
        }
    }
}

impl<F> fmt::Debug for NamedFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedFn")
            .field("name", &self.name)
            .field("signature", &std::any::type_name::<F>())
            .finish()
    }
}

impl<F: Copy + Send + Sync + 'static> Archivable for NamedFn<F> {
    const COOKIE: u8 = CALLABLE_COOKIE;

    fn store_payload<A: OutputArchive + ?Sized>(&self, ar: &mut A) -> Result<()> {
        self.name.store_payload(ar)
    }

    fn load_payload<A: InputArchive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        let mut name = String::new();
        name.load_payload(ar)?;
        *self = if name.is_empty() {
            Self::default()
        } else {
            Self::resolve(&name)?
        };
        Ok(())
    }
}
