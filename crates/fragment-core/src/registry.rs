//! Fragment registry.
//!
//! Feature code registers derivers on a [`RegistryBuilder`] during startup;
//! [`RegistryBuilder::build`] freezes the table into an immutable
//! [`Registry`] that interceptors share by `Arc` without locking.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::deriver::KeyDeriver;
use crate::fragment::{FragmentName, FragmentType};

type DeriverTable = HashMap<FragmentName, Arc<dyn KeyDeriver>>;

/// Startup-time builder for the fragment registry.
#[derive(Default)]
pub struct RegistryBuilder {
    blocks: DeriverTable,
    api: DeriverTable,
}

impl RegistryBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    fn table_mut(&mut self, fragment_type: FragmentType) -> &mut DeriverTable {
        match fragment_type {
            FragmentType::Block => &mut self.blocks,
            FragmentType::Api => &mut self.api,
        }
    }

    /// Register (or replace) the deriver for `(fragment_type, name)`.
    ///
    /// The last registration for a pair wins. Block and API names live in
    /// separate tables, so the same name may be registered under both.
    pub fn register<D>(
        &mut self,
        fragment_type: FragmentType,
        name: impl Into<FragmentName>,
        deriver: D,
    ) -> &mut Self
    where
        D: KeyDeriver + 'static,
    {
        self.register_shared(fragment_type, name, Arc::new(deriver))
    }

    /// Register an already shared deriver.
    pub fn register_shared(
        &mut self,
        fragment_type: FragmentType,
        name: impl Into<FragmentName>,
        deriver: Arc<dyn KeyDeriver>,
    ) -> &mut Self {
        let name = name.into();
        if self.table_mut(fragment_type).insert(name.clone(), deriver).is_some() {
            debug!(fragment = %fragment_type, name = %name, "replaced key deriver");
        } else {
            debug!(fragment = %fragment_type, name = %name, "registered key deriver");
        }
        self
    }

    /// Register using a type string (`"block"` or `"api"`).
    ///
    /// Unknown type strings are ignored with a warning.
    pub fn mark_fragment_cacheable<D>(
        &mut self,
        fragment_type: &str,
        name: impl Into<FragmentName>,
        deriver: D,
    ) -> &mut Self
    where
        D: KeyDeriver + 'static,
    {
        match fragment_type.parse::<FragmentType>() {
            Ok(ty) => self.register(ty, name, deriver),
            Err(err) => {
                let name: FragmentName = name.into();
                warn!(name = %name, error = %err, "ignoring fragment registration");
                self
            }
        }
    }

    /// Freeze the registry.
    pub fn build(self) -> Registry {
        Registry {
            blocks: self.blocks,
            api: self.api,
        }
    }
}

/// Immutable `(fragment type, name) -> deriver` table.
#[derive(Clone, Default)]
pub struct Registry {
    blocks: DeriverTable,
    api: DeriverTable,
}

impl Registry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    fn table(&self, fragment_type: FragmentType) -> &DeriverTable {
        match fragment_type {
            FragmentType::Block => &self.blocks,
            FragmentType::Api => &self.api,
        }
    }

    /// Look up the deriver for `(fragment_type, name)`.
    ///
    /// `None` means "not cacheable"; callers fall through to normal behavior.
    pub fn lookup(&self, fragment_type: FragmentType, name: &str) -> Option<&dyn KeyDeriver> {
        self.table(fragment_type).get(name).map(|d| d.as_ref())
    }

    /// Whether `(fragment_type, name)` is registered.
    pub fn contains(&self, fragment_type: FragmentType, name: &str) -> bool {
        self.table(fragment_type).contains_key(name)
    }

    /// Registered names for one fragment type, sorted.
    pub fn names(&self, fragment_type: FragmentType) -> Vec<&FragmentName> {
        let mut names: Vec<_> = self.table(fragment_type).keys().collect();
        names.sort();
        names
    }

    /// Total number of registrations across both tables.
    pub fn len(&self) -> usize {
        self.blocks.len() + self.api.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("blocks", &self.names(FragmentType::Block))
            .field("api", &self.names(FragmentType::Api))
            .finish()
    }
}
