use std::path::Path;

use anyhow::Context;
use chrono::TimeZone;
use colored::Colorize;
use serde_json::json;
use thrap_kv::{KvEngine, MemoryEngine, RedbEngine};
use thrap_registry::{EntityStore, Identity, Registry, Stack, Version};
use thrap_store::{ChainHeader, Digest};
use tracing::warn;

use crate::cli::*;
use crate::config::{EngineKind, StoreConfig, DEFAULT_DATA_DIR};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| DEFAULT_DATA_DIR.into());
    let mut config = StoreConfig::load(&data_dir)?;

    match cli.command {
        Command::Init(args) => {
            if let Some(hash) = cli.hash {
                config.hash = hash;
            }
            cmd_init(&config, args)
        }
        command => {
            if cli.hash.is_some() {
                warn!("--hash only applies to init; using {}", config.hash);
            }
            let algorithm = config.algorithm()?;
            match config.engine {
                EngineKind::Redb => {
                    let engine = RedbEngine::open(&config.data_dir)
                        .with_context(|| format!("opening store in {}", config.data_dir.display()))?;
                    dispatch(&Registry::new(engine, algorithm), &config, cli.format, command)
                }
                EngineKind::Memory => {
                    warn!("memory engine selected, nothing will persist");
                    dispatch(&Registry::new(MemoryEngine::new(), algorithm), &config, cli.format, command)
                }
            }
        }
    }
}

fn dispatch<E: KvEngine>(
    registry: &Registry<E>,
    config: &StoreConfig,
    format: OutputFormat,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Init(args) => cmd_init(config, args),
        Command::Stack(args) => cmd_stack(&registry.open(&config.stack_prefix), args.action, format),
        Command::Identity(args) => {
            cmd_identity(&registry.open(&config.identity_prefix), args.action, format)
        }
        Command::Refs(args) => {
            let prefix = if args.identity {
                &config.identity_prefix
            } else {
                &config.stack_prefix
            };
            cmd_refs(registry, prefix, &args.namespace, format)
        }
    }
}

fn cmd_init(config: &StoreConfig, args: InitArgs) -> anyhow::Result<()> {
    if config.path().exists() && !args.force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config.path().display()
        );
    }
    config.algorithm()?;
    let path = config.save()?;
    if config.engine == EngineKind::Redb {
        RedbEngine::open(&config.data_dir)?;
    }
    println!(
        "{} Initialized thrap store in {}",
        "✓".green().bold(),
        config.data_dir.display().to_string().bold()
    );
    println!("  Config: {}", path.display());
    println!("  Hash: {}", config.hash.cyan());
    Ok(())
}

// ---- Stacks ----

fn cmd_stack<E: KvEngine>(
    stacks: &EntityStore<E, Stack>,
    action: StackAction,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match action {
        StackAction::Register { file } => {
            let (stack, header) = stacks.create(read_manifest(&file)?)?;
            println!("{} Registered stack {}", "✓".green().bold(), stack.id.yellow().bold());
            print_header(&header);
        }
        StackAction::Update { file } => {
            let (stack, header) = stacks.update(read_manifest(&file)?)?;
            println!("{} Updated stack {}", "✓".green().bold(), stack.id.yellow().bold());
            print_header(&header);
        }
        StackAction::Show { id } => {
            let (stack, header) = stacks.get_with_header(&id)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stack)?),
                OutputFormat::Text => print_stack(&stack, &header),
            }
        }
        StackAction::Log { id, oneline } => {
            let versions = stacks.history(&id)?;
            match format {
                OutputFormat::Json => {
                    let out: Vec<_> = versions.iter().map(version_json).collect();
                    println!("{}", serde_json::to_string_pretty(&out)?);
                }
                OutputFormat::Text => {
                    for version in &versions {
                        print_version(version, oneline);
                    }
                }
            }
        }
        StackAction::List => print_ids(&stacks.list()?, format)?,
        StackAction::Verify { id } => {
            let length = stacks.verify(&id)?;
            println!(
                "{} Chain for {} intact: {} headers",
                "✓".green().bold(),
                id.yellow(),
                length.to_string().bold()
            );
        }
        StackAction::Delete { id } => {
            stacks.delete(&id)?;
            println!("Unregistered stack {}", id.yellow());
        }
    }
    Ok(())
}

fn read_manifest(path: &Path) -> anyhow::Result<Stack> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn print_stack(stack: &Stack, header: &ChainHeader) {
    println!("Stack {} ({})", stack.id.yellow().bold(), stack.name);
    if !stack.version.is_empty() {
        println!("  Version: {}", stack.version);
    }
    if !stack.description.is_empty() {
        println!("  Description: {}", stack.description);
    }
    print_header(header);

    let mut keys: Vec<_> = stack.components.keys().collect();
    keys.sort();
    for key in keys {
        let c = &stack.components[key];
        let kind = c.kind.map(|k| k.as_str()).unwrap_or("?");
        let head = if c.head { " head".green().to_string() } else { String::new() };
        println!("  component {} [{}] {}{}", key.bold(), kind.cyan(), c.name, head);
    }
    let mut keys: Vec<_> = stack.dependencies.keys().collect();
    keys.sort();
    for key in keys {
        let d = &stack.dependencies[key];
        println!("  dependency {} {} {}", key.bold(), d.name, d.version.dimmed());
    }
}

fn print_header(header: &ChainHeader) {
    println!(
        "  Height: {}  Data: {}  At: {}",
        header.height.to_string().bold(),
        header.data_digest.short_hex().dimmed(),
        format_time(header.timestamp)
    );
}

fn print_version(version: &Version<Stack>, oneline: bool) {
    let height = format!("#{}", version.header.height);
    if oneline {
        println!(
            "{} {} {}",
            height.yellow(),
            version.digest.short_hex().dimmed(),
            version.entity.version
        );
    } else {
        println!("{}  {}", height.yellow().bold(), version.digest.to_hex().dimmed());
        println!("  At: {}", format_time(version.header.timestamp));
        println!("  Data: {}", version.header.data_digest.to_hex());
        println!("  Version: {}", version.entity.version);
        println!();
    }
}

fn version_json(version: &Version<Stack>) -> serde_json::Value {
    json!({
        "height": version.header.height,
        "digest": version.digest.to_hex(),
        "previous": version.header.previous.to_hex(),
        "data_digest": version.header.data_digest.to_hex(),
        "timestamp": format_time(version.header.timestamp),
        "stack": version.entity,
    })
}

// ---- Identities ----

fn cmd_identity<E: KvEngine>(
    identities: &EntityStore<E, Identity>,
    action: IdentityAction,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match action {
        IdentityAction::Register {
            email,
            public_key,
            id,
        } => {
            let key = hex::decode(&public_key).context("public key is not valid hex")?;
            let mut ident = Identity::new(&email, key);
            if let Some(id) = id {
                ident.id = id;
            }
            let (ident, header) = identities.create(ident)?;
            println!("{} Registered identity {}", "✓".green().bold(), ident.id.yellow().bold());
            print_header(&header);
        }
        IdentityAction::Show { id } => {
            let ident = identities.get(&id)?;
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "id": ident.id,
                        "email": ident.email,
                        "public_key": ident.public_key_hex(),
                        "nonce": ident.nonce,
                        "meta": ident.meta,
                    }))?
                ),
                OutputFormat::Text => {
                    println!("Identity {}", ident.id.yellow().bold());
                    println!("  Email: {}", ident.email);
                    println!("  Public key: {}", ident.public_key_hex().cyan());
                    let mut meta: Vec<_> = ident.meta.iter().collect();
                    meta.sort();
                    for (key, value) in meta {
                        println!("  {key}: {value}");
                    }
                }
            }
        }
        IdentityAction::List => print_ids(&identities.list()?, format)?,
    }
    Ok(())
}

// ---- Refs ----

fn cmd_refs<E: KvEngine>(
    registry: &Registry<E>,
    prefix: &str,
    namespace: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut refs: Vec<(String, Digest)> = Vec::new();
    registry.refs(prefix).iter_refs(namespace, |name, digest| {
        refs.push((name.to_string(), digest.clone()));
        Ok(())
    })?;

    match format {
        OutputFormat::Json => {
            let out: serde_json::Map<_, _> = refs
                .iter()
                .map(|(name, digest)| (name.clone(), json!(digest.to_hex())))
                .collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text if refs.is_empty() => println!("No refs in {}.", namespace.yellow()),
        OutputFormat::Text => {
            for (name, digest) in &refs {
                println!("{} {}", digest.short_hex().dimmed(), name.green());
            }
        }
    }
    Ok(())
}

fn print_ids(ids: &[String], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(ids)?),
        OutputFormat::Text if ids.is_empty() => println!("Nothing registered."),
        OutputFormat::Text => {
            for id in ids {
                println!("{id}");
            }
        }
    }
    Ok(())
}

fn format_time(nanos: i64) -> String {
    chrono::Utc.timestamp_nanos(nanos).to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use thrap_crypto::Sha256;

    fn manifest(dir: &Path, name: &str, description: &str) -> std::path::PathBuf {
        let path = dir.join(format!("{name}.json"));
        let body = json!({
            "name": name,
            "version": "0.1.0",
            "description": description,
            "components": {
                "db": {"name": "postgres", "type": "datastore", "version": "15"}
            }
        });
        std::fs::write(&path, body.to_string()).unwrap();
        path
    }

    #[test]
    fn register_update_and_log() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new(MemoryEngine::new(), Arc::new(Sha256));
        let stacks = registry.open::<Stack>("/stack");

        let v1 = manifest(dir.path(), "foo", "first");
        cmd_stack(&stacks, StackAction::Register { file: v1.clone() }, OutputFormat::Text).unwrap();
        assert!(cmd_stack(&stacks, StackAction::Register { file: v1 }, OutputFormat::Text).is_err());

        let v2 = manifest(dir.path(), "foo", "second");
        cmd_stack(&stacks, StackAction::Update { file: v2 }, OutputFormat::Json).unwrap();
        assert_eq!(stacks.get("foo").unwrap().description, "second");

        let log = StackAction::Log {
            id: "foo".into(),
            oneline: true,
        };
        cmd_stack(&stacks, log, OutputFormat::Text).unwrap();
        cmd_stack(&stacks, StackAction::Verify { id: "foo".into() }, OutputFormat::Text).unwrap();
        cmd_refs(&registry, "/stack", "foo", OutputFormat::Json).unwrap();
    }

    #[test]
    fn bad_manifest_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = read_manifest(&path).unwrap_err();
        assert!(err.to_string().contains("parsing"));
    }

    #[test]
    fn identity_requires_hex_key() {
        let registry = Registry::new(MemoryEngine::new(), Arc::new(Sha256));
        let identities = registry.open::<Identity>("/identity");
        let bad = IdentityAction::Register {
            email: "a@b.c".into(),
            public_key: "zz".into(),
            id: None,
        };
        assert!(cmd_identity(&identities, bad, OutputFormat::Text).is_err());
        let good = IdentityAction::Register {
            email: "a@b.c".into(),
            public_key: "0a0b".into(),
            id: None,
        };
        cmd_identity(&identities, good, OutputFormat::Text).unwrap();
        assert_eq!(identities.get("a@b.c").unwrap().public_key, vec![0x0a, 0x0b]);
    }

    #[test]
    fn format_time_is_rfc3339() {
        assert_eq!(format_time(0), "1970-01-01T00:00:00+00:00");
    }
}
