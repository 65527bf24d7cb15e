//! `nexus server` — manage server definitions in the registry.

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use clap::{ArgGroup, Args, Subcommand};

use nexus_core::{
    registry,
    types::{ServerDefinition, ServerId, ServerSource, TargetId, Transport},
};
use nexus_sync::import_from_target_at;

use super::super::TargetArg;
use super::notify_daemon;

#[derive(Subcommand, Debug)]
pub enum ServerCommand {
    /// List every server definition with its enabled targets.
    List,

    /// Add a server definition to the registry.
    Add(AddArgs),

    /// Remove a server definition by id.
    Remove(RemoveArgs),

    /// Enable a server globally, or for specific targets.
    Enable(ToggleArgs),

    /// Disable a server globally, or for specific targets.
    Disable(ToggleArgs),

    /// Pull existing server entries out of a client's config.
    Import(ImportArgs),
}

#[derive(Args, Debug)]
#[command(group = ArgGroup::new("source").required(true))]
pub struct AddArgs {
    /// Display name; the id is derived from it (e.g. "GitHub MCP" → github-mcp).
    pub name: String,

    /// npm package, launched through `npx -y`.
    #[arg(long, value_name = "PACKAGE", group = "source")]
    pub npm: Option<String>,

    /// Python package, launched through `uvx`.
    #[arg(long, value_name = "PACKAGE", group = "source")]
    pub uvx: Option<String>,

    /// Docker image, launched through `docker run -i --rm`.
    #[arg(long, value_name = "IMAGE", group = "source")]
    pub docker: Option<String>,

    /// Remote SSE endpoint URL.
    #[arg(long, value_name = "URL", group = "source")]
    pub url: Option<String>,

    /// Local command, launched directly.
    #[arg(long, value_name = "COMMAND", group = "source")]
    pub local: Option<String>,

    /// Pin the npm package to a version.
    #[arg(long, requires = "npm")]
    pub version: Option<String>,

    /// Extra launch argument, passed through verbatim (repeatable).
    #[arg(long = "arg", value_name = "ARG")]
    pub args: Vec<String>,

    /// Environment variable for the server process (repeatable).
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// HTTP header for the SSE transport (repeatable).
    #[arg(long = "header", value_name = "KEY=VALUE", requires = "url")]
    pub headers: Vec<String>,

    /// Enable the server for a target right away (repeatable).
    #[arg(long = "target", value_name = "TARGET")]
    pub targets: Vec<TargetArg>,

    /// Free-form description.
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Server id, as shown by `nexus server list`.
    pub id: String,
}

#[derive(Args, Debug)]
pub struct ToggleArgs {
    /// Server id, as shown by `nexus server list`.
    pub id: String,

    /// Apply to these targets instead of the server's global switch (repeatable).
    #[arg(long = "target", value_name = "TARGET")]
    pub targets: Vec<TargetArg>,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Target whose config to read (e.g. cursor, vscode).
    pub target: TargetArg,

    /// Replace registry servers whose names collide with imported entries.
    #[arg(long)]
    pub overwrite: bool,
}

pub fn run(cmd: ServerCommand) -> Result<()> {
    match cmd {
        ServerCommand::List => list(),
        ServerCommand::Add(args) => add(args),
        ServerCommand::Remove(args) => remove(args),
        ServerCommand::Enable(args) => toggle(args, true),
        ServerCommand::Disable(args) => toggle(args, false),
        ServerCommand::Import(args) => import(args),
    }
}

fn list() -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    let registry_doc =
        registry::load_at(&home).context("failed to load registry — run `nexus init` first")?;

    if registry_doc.servers.is_empty() {
        println!("No servers in the registry.");
        println!("Run: nexus server add <name> --npm <package>");
        return Ok(());
    }

    for server in &registry_doc.servers {
        let state = if server.enabled { "" } else { " [disabled]" };
        println!("{} ({}){state}", server.id, server.name);
        println!("  source: {}", describe_source(&server.source));
        if server.enabled_targets.is_empty() {
            println!("  targets: none");
        } else {
            let targets: Vec<&str> = server.enabled_targets.iter().map(|t| t.as_str()).collect();
            println!("  targets: {}", targets.join(", "));
        }
        if let Some(description) = &server.description {
            println!("  {description}");
        }
    }
    Ok(())
}

fn add(args: AddArgs) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    let server = build_definition(&args)?;
    let id = server.id.clone();

    let added = registry::add_server_at(&home, server)
        .with_context(|| format!("failed to add server '{}'", args.name))?;
    notify_daemon(&home);

    println!("✓ Added '{}' (id: {id})", added.name);
    if added.enabled_targets.is_empty() {
        println!("  Not enabled for any target yet. Run: nexus server enable {id} --target cursor");
    } else {
        let targets: Vec<&str> = added.enabled_targets.iter().map(|t| t.as_str()).collect();
        println!("  Enabled for: {}", targets.join(", "));
    }
    Ok(())
}

fn remove(args: RemoveArgs) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    let removed = registry::remove_server_at(&home, &ServerId::from(args.id.as_str()))
        .with_context(|| format!("failed to remove server '{}'", args.id))?;
    notify_daemon(&home);

    println!("✓ Removed '{}'", removed.name);
    Ok(())
}

fn toggle(args: ToggleArgs, enabled: bool) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    let id = ServerId::from(args.id.as_str());

    if args.targets.is_empty() {
        let registry_doc =
            registry::load_at(&home).context("failed to load registry — run `nexus init` first")?;
        let mut server = registry_doc
            .find_server(&id)
            .cloned()
            .ok_or_else(|| anyhow!("no server with id '{id}'"))?;
        server.enabled = enabled;
        registry::update_server_at(&home, server)
            .with_context(|| format!("failed to update server '{id}'"))?;
    } else {
        for target in &args.targets {
            registry::toggle_target_at(&home, &id, target.0, enabled)
                .with_context(|| format!("failed to update '{id}' for {target}"))?;
        }
    }
    notify_daemon(&home);

    let verb = if enabled { "Enabled" } else { "Disabled" };
    if args.targets.is_empty() {
        println!("✓ {verb} '{id}'");
    } else {
        let names: Vec<String> = args.targets.iter().map(|t| t.to_string()).collect();
        println!("✓ {verb} '{id}' for: {}", names.join(", "));
    }
    Ok(())
}

fn import(args: ImportArgs) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    let target: TargetId = args.target.into();

    let report = import_from_target_at(&home, target, args.overwrite)
        .with_context(|| format!("import from {target} failed"))?;

    if report.imported == 0 && report.skipped == 0 {
        println!("Nothing to import from {}.", target.display_name());
        return Ok(());
    }
    if report.imported > 0 {
        notify_daemon(&home);
    }

    println!(
        "✓ Imported {} server(s) from {} ({} skipped)",
        report.imported,
        target.display_name(),
        report.skipped
    );
    for name in &report.names {
        println!("  + {name}");
    }
    if report.skipped > 0 {
        println!("  Skipped entries already exist; pass --overwrite to replace them.");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Definition construction
// ---------------------------------------------------------------------------

/// Build the definition and its launch transport from the source flags.
/// The derivations mirror what `server import` infers in the other direction.
fn build_definition(args: &AddArgs) -> Result<ServerDefinition> {
    let env = parse_kv(&args.env, "--env")?;
    let headers = parse_kv(&args.headers, "--header")?;

    let (source, transport) = if let Some(package) = &args.npm {
        let spec = match &args.version {
            Some(version) => format!("{package}@{version}"),
            None => package.clone(),
        };
        let mut launch = vec!["-y".to_string(), spec];
        launch.extend(args.args.iter().cloned());
        (
            ServerSource::Npm {
                package: package.clone(),
                version: args.version.clone(),
            },
            Transport::Stdio {
                command: "npx".to_string(),
                args: launch,
                env,
            },
        )
    } else if let Some(package) = &args.uvx {
        let mut launch = vec![package.clone()];
        launch.extend(args.args.iter().cloned());
        (
            ServerSource::Uvx {
                package: package.clone(),
            },
            Transport::Stdio {
                command: "uvx".to_string(),
                args: launch,
                env,
            },
        )
    } else if let Some(image) = &args.docker {
        let mut launch = vec![
            "run".to_string(),
            "-i".to_string(),
            "--rm".to_string(),
            image.clone(),
        ];
        launch.extend(args.args.iter().cloned());
        (
            ServerSource::Docker {
                image: image.clone(),
            },
            Transport::Stdio {
                command: "docker".to_string(),
                args: launch,
                env,
            },
        )
    } else if let Some(url) = &args.url {
        (
            ServerSource::Remote { url: url.clone() },
            Transport::Sse {
                url: url.clone(),
                headers,
            },
        )
    } else if let Some(command) = &args.local {
        (
            ServerSource::Local {
                path: command.clone(),
            },
            Transport::Stdio {
                command: command.clone(),
                args: args.args.clone(),
                env,
            },
        )
    } else {
        return Err(anyhow!(
            "specify a source: --npm, --uvx, --docker, --url, or --local"
        ));
    };

    let mut server = ServerDefinition::new(
        ServerId::slug(&args.name),
        args.name.clone(),
        source,
        transport,
    );
    server.description = args.description.clone();
    server.version = args.version.clone();
    for target in &args.targets {
        server.enable_for(target.0);
    }
    Ok(server)
}

fn parse_kv(pairs: &[String], flag: &str) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("{flag} expects KEY=VALUE, got '{pair}'"))?;
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

fn describe_source(source: &ServerSource) -> String {
    match source {
        ServerSource::Npm {
            package,
            version: Some(version),
        } => format!("npm {package}@{version}"),
        ServerSource::Npm {
            package,
            version: None,
        } => format!("npm {package}"),
        ServerSource::Uvx { package } => format!("uvx {package}"),
        ServerSource::Local { path } => format!("local {path}"),
        ServerSource::Docker { image } => format!("docker {image}"),
        ServerSource::Remote { url } => format!("remote {url}"),
        ServerSource::Github {
            repo,
            branch: Some(branch),
        } => format!("github {repo}#{branch}"),
        ServerSource::Github { repo, branch: None } => format!("github {repo}"),
    }
}
