// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::path::Path;

use anyhow::Result;
use omxil::{Core, CoreConfig};

/// List registered components, optionally filtered by role.
pub fn components(config_dir: &Path, role: Option<&str>) -> Result<()> {
    let core = Core::new(CoreConfig::load_or_default(config_dir));

    let names = match role {
        Some(role) => core.components_of_role(role),
        None => core.component_names(),
    };

    if names.is_empty() {
        println!("No components registered.");
        return Ok(());
    }

    println!("Available components ({}):\n", names.len());
    for name in &names {
        println!("  {}", name);
        for role in core.roles_of_component(name)? {
            println!("    - {}", role);
        }
    }

    Ok(())
}
