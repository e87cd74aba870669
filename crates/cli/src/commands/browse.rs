//! Dual-pane browser
//!
//! Wires a backend, the listing cache, the transfer engine and the dispatcher
//! together, then hands stdin to the shell.

use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use sc_core::{
    parse_location, Config, ConfigManager, Dispatcher, DispatcherOptions, ListingCache, Location,
    MemoryStore, Namespace, ObjectStore, Profile, ProfileManager, TimedStore, TransferEngine,
};
use sc_s3::S3Client;
use tracing::{debug, info, warn};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, RenderOptions, Theme};
use crate::shell::Shell;

/// Arguments for the `browse` command
#[derive(Args, Debug, Default)]
pub struct BrowseArgs {
    /// Profile to connect with (default: the configured default profile)
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Browse a seeded in-memory store instead of a real endpoint
    #[arg(long, default_value = "false")]
    pub memory: bool,

    /// Hide last-modified times
    #[arg(long, default_value = "false")]
    pub no_times: bool,

    /// Left pane location (bucket/prefix; empty for the bucket list)
    pub left: Option<String>,

    /// Right pane location
    pub right: Option<String>,
}

/// In-memory store with a few buckets to explore
pub fn demo_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store.insert("demo", "logs/2024/a.txt", "first log line\n");
    store.insert("demo", "logs/2024/b.txt", "second log line\n");
    store.insert("demo", "logs/2024/sub/c.txt", "nested log line\n");
    store.insert("demo", "readme.md", "# demo bucket\n");
    store.add_bucket("archive");
    Arc::new(store)
}

/// Profile named on the command line, the configured default, or the SDK chain
fn resolve_profile(config: &Config, manager: ConfigManager, name: Option<&str>) -> anyhow::Result<Profile> {
    let name = name.or(config.defaults.profile.as_deref());
    match name {
        Some(name) => ProfileManager::with_config_manager(manager)
            .get(name)
            .with_context(|| format!("Failed to load profile '{name}'")),
        None => match config.profiles.as_slice() {
            [only] => Ok(only.clone()),
            _ => {
                debug!("No profile selected, using the SDK provider chain");
                Ok(Profile::new("default"))
            }
        },
    }
}

async fn backend(args: &BrowseArgs, config: &Config, manager: ConfigManager) -> anyhow::Result<Arc<dyn ObjectStore>> {
    if args.memory {
        info!("Using the in-memory demo store");
        return Ok(demo_store());
    }
    let profile = resolve_profile(config, manager, args.profile.as_deref())?;
    info!(profile = %profile.name, "Connecting");
    let client = S3Client::new(&profile)
        .await
        .with_context(|| format!("Failed to create client for profile '{}'", profile.name))?;
    Ok(Arc::new(client))
}

/// Build a dispatcher over `store` using the settings in `config`
pub fn build_dispatcher(store: Arc<dyn ObjectStore>, config: &Config) -> Dispatcher {
    let store: Arc<dyn ObjectStore> = Arc::new(TimedStore::new(store, config.transfer.call_timeout()));
    let namespace = Namespace::new(store, ListingCache::new(config.namespace.cache_ttl()))
        .with_page_size(config.namespace.page_size);
    let engine = TransferEngine::new(namespace, config.transfer.clone())
        .with_delimiter(config.namespace.delimiter.clone());
    Dispatcher::new(engine, DispatcherOptions::from_config(config))
}

fn location(arg: Option<&str>, delimiter: &str) -> anyhow::Result<Location> {
    match arg {
        Some(text) => parse_location(text, delimiter).with_context(|| format!("Bad location '{text}'")),
        None => Ok(Location::buckets()),
    }
}

async fn open(args: &BrowseArgs, config: &Config, manager: ConfigManager) -> anyhow::Result<Dispatcher> {
    let store = backend(args, config, manager).await?;
    let delimiter = config.namespace.delimiter.as_str();
    let left = location(args.left.as_deref(), delimiter)?;
    let right = location(args.right.as_deref(), delimiter)?;

    let mut dispatcher = build_dispatcher(store, config);
    dispatcher
        .init(left, right)
        .await
        .context("Failed to open the initial locations")?;
    Ok(dispatcher)
}

fn theme(config: &Config) -> Theme {
    Theme::from_name(&config.defaults.theme).unwrap_or_else(|| {
        warn!(theme = %config.defaults.theme, "Unknown theme, using the default");
        Theme::default()
    })
}

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<sc_core::Error>())
        .map(ExitCode::for_error)
        .unwrap_or(ExitCode::GeneralError)
}

/// Execute the browse command
pub async fn execute(args: BrowseArgs, manager: ConfigManager, mut output: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output.clone());

    let config = match manager.load() {
        Ok(config) => config,
        Err(e) => {
            formatter.error(&format!("Failed to load configuration: {e}"));
            return ExitCode::for_error(&e);
        }
    };
    if !config.defaults.progress {
        output.no_progress = true;
    }

    let dispatcher = match open(&args, &config, manager).await {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return exit_code_for(&e);
        }
    };

    let render = RenderOptions {
        colors: formatter.colors_enabled(),
        times: !args.no_times,
        theme: theme(&config),
    };
    let shell = Shell::new(dispatcher, std::io::stdout(), render, output);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let (code, _) = shell.run(stdin).await;
    code
}
