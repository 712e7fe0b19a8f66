// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Process-wide core: component registry, resource manager and configuration.
//!
//! A [`Core`] can be created and owned directly, or installed as the process
//! global with [`init`] / [`deinit`].

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::core::callbacks::ComponentCallbacks;
use crate::core::component::Component;
use crate::core::config::CoreConfig;
use crate::core::error::{OmxError, Result};
use crate::core::port::BufferSupplier;
use crate::core::registry::{ComponentFactory, ComponentRegistry};
use crate::core::resources::ResourceManager;
use crate::core::tunnel;

pub struct Core {
    config: CoreConfig,
    registry: RwLock<ComponentRegistry>,
    resources: Arc<ResourceManager>,
}

impl Core {
    /// Core with every component registered through `register_component!`.
    pub fn new(config: CoreConfig) -> Self {
        let resources = Arc::new(ResourceManager::new(config.resources.budget_bytes));
        let registry = ComponentRegistry::with_registered();
        tracing::info!(
            "Core ready: {} components, resource budget {} bytes",
            registry.len(),
            config.resources.budget_bytes
        );
        Self {
            config,
            registry: RwLock::new(registry),
            resources,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    /// Register a component at runtime.
    pub fn register_component(
        &self,
        name: &str,
        roles: &[&str],
        factory: ComponentFactory,
    ) -> Result<()> {
        self.registry.write().register(name, roles, factory)?;
        tracing::debug!("Registered component {}", name);
        Ok(())
    }

    /// Registered component names, sorted.
    pub fn component_names(&self) -> Vec<String> {
        self.registry.read().names()
    }

    /// Name at `index` in [`component_names`](Self::component_names) order.
    pub fn component_name_at(&self, index: usize) -> Result<String> {
        self.registry.read().name_at(index)
    }

    pub fn roles_of_component(&self, name: &str) -> Result<Vec<String>> {
        self.registry.read().roles_of(name)
    }

    pub fn components_of_role(&self, role: &str) -> Vec<String> {
        self.registry.read().components_of_role(role)
    }

    /// Instantiate `name` in `Loaded`, reporting to `callbacks`.
    pub fn create_component(
        &self,
        name: &str,
        callbacks: Arc<dyn ComponentCallbacks>,
    ) -> Result<Component> {
        let processor = self.registry.read().resolve(name)?.create();
        Component::spawn(
            name,
            processor,
            callbacks,
            Arc::clone(&self.resources),
            &self.config,
        )
    }

    pub fn setup_tunnel(
        &self,
        output: &Component,
        out_port: u32,
        input: &Component,
        in_port: u32,
    ) -> Result<BufferSupplier> {
        tunnel::setup_tunnel(output, out_port, input, in_port)
    }

    pub fn teardown_tunnel(
        &self,
        output: &Component,
        out_port: u32,
        input: &Component,
        in_port: u32,
    ) -> Result<()> {
        tunnel::teardown_tunnel(output, out_port, input, in_port)
    }
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("config", &self.config)
            .field("components", &self.registry.read().len())
            .field("resources", &self.resources)
            .finish()
    }
}

static GLOBAL_CORE: Mutex<Option<Arc<Core>>> = parking_lot::const_mutex(None);

/// Install the process-global core.
pub fn init(config: CoreConfig) -> Result<Arc<Core>> {
    let mut global = GLOBAL_CORE.lock();
    if global.is_some() {
        return Err(OmxError::IncorrectStateOperation);
    }
    let core = Arc::new(Core::new(config));
    *global = Some(Arc::clone(&core));
    Ok(core)
}

/// Remove the process-global core. Components already created keep running
/// until dropped.
pub fn deinit() -> Result<()> {
    match GLOBAL_CORE.lock().take() {
        Some(_) => {
            tracing::info!("Core deinitialized");
            Ok(())
        }
        None => Err(OmxError::NotReady),
    }
}

/// The process-global core.
pub fn core() -> Result<Arc<Core>> {
    GLOBAL_CORE.lock().clone().ok_or(OmxError::NotReady)
}
