// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Component registry: name -> roles + processor factory.

use std::collections::BTreeMap;

use crate::core::error::{OmxError, Result};
use crate::core::processor::ComponentProcessor;

/// Longest accepted component name, in bytes.
pub const MAX_COMPONENT_NAME_LEN: usize = 127;

pub type ComponentFactory = fn() -> Box<dyn ComponentProcessor>;

/// Link-time registration entry, submitted by [`register_component!`](crate::register_component).
pub struct ComponentRegistration {
    pub name: &'static str,
    pub roles: &'static [&'static str],
    pub factory: ComponentFactory,
}

inventory::collect!(ComponentRegistration);

/// Register a component with every core created in this process.
///
/// ```ignore
/// omxil::register_component!("OMX.acme.decoder", ["video_decoder.avc"], AcmeDecoder::create);
/// ```
#[macro_export]
macro_rules! register_component {
    ($name:expr, [$($role:expr),* $(,)?], $factory:path) => {
        $crate::inventory::submit! {
            $crate::core::registry::ComponentRegistration {
                name: $name,
                roles: &[$($role),*],
                factory: $factory,
            }
        }
    };
}

#[derive(Clone)]
pub struct ComponentEntry {
    pub name: String,
    pub roles: Vec<String>,
    factory: ComponentFactory,
}

impl ComponentEntry {
    pub fn create(&self) -> Box<dyn ComponentProcessor> {
        (self.factory)()
    }
}

impl std::fmt::Debug for ComponentEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentEntry")
            .field("name", &self.name)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct ComponentRegistry {
    components: BTreeMap<String, ComponentEntry>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-filled with every link-time registration.
    pub fn with_registered() -> Self {
        let mut registry = Self::new();
        for registration in inventory::iter::<ComponentRegistration> {
            let registered =
                registry.register(registration.name, registration.roles, registration.factory);
            if let Err(e) = registered {
                tracing::warn!(
                    "Failed to auto-register component '{}': {}",
                    registration.name,
                    e
                );
            }
        }
        tracing::debug!("Registered {} components from inventory", registry.len());
        registry
    }

    pub fn register(
        &mut self,
        name: &str,
        roles: &[&str],
        factory: ComponentFactory,
    ) -> Result<()> {
        validate_name(name)?;
        if self.components.contains_key(name) {
            return Err(OmxError::BadParameter);
        }

        self.components.insert(
            name.to_string(),
            ComponentEntry {
                name: name.to_string(),
                roles: roles.iter().map(|r| r.to_string()).collect(),
                factory,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ComponentEntry> {
        self.components.get(name)
    }

    /// Look up `name` for instantiation.
    pub fn resolve(&self, name: &str) -> Result<&ComponentEntry> {
        validate_name(name)?;
        self.components.get(name).ok_or(OmxError::ComponentNotFound)
    }

    /// Registered names in ascending order.
    pub fn names(&self) -> Vec<String> {
        self.components.keys().cloned().collect()
    }

    /// Enumerate names by index; `NoMore` past the end.
    pub fn name_at(&self, index: usize) -> Result<String> {
        self.components
            .keys()
            .nth(index)
            .cloned()
            .ok_or(OmxError::NoMore)
    }

    pub fn roles_of(&self, name: &str) -> Result<Vec<String>> {
        self.resolve(name).map(|entry| entry.roles.clone())
    }

    pub fn components_of_role(&self, role: &str) -> Vec<String> {
        self.components
            .values()
            .filter(|entry| entry.roles.iter().any(|r| r == role))
            .map(|entry| entry.name.clone())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.components.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_COMPONENT_NAME_LEN {
        return Err(OmxError::InvalidComponentName);
    }
    Ok(())
}
