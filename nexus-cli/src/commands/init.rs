//! `nexus init` — first-run registry scaffold.

use anyhow::{Context, Result};

use nexus_core::registry;

pub fn run() -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;

    let (registry, created) =
        registry::init_at(&home).context("failed to initialize the registry")?;
    let path = registry::registry_path_at(&home);

    if created {
        println!("✓ Created {}", path.display());
        println!("  Add a server: nexus server add <name> --npm <package> --target cursor");
    } else {
        println!(
            "Registry already exists at {} ({} servers)",
            path.display(),
            registry.servers.len()
        );
    }
    Ok(())
}
