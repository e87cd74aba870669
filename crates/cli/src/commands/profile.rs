//! Profile management commands
//!
//! Profiles name S3-compatible endpoints. Keys are optional; a profile
//! without them resolves credentials through the SDK provider chain.

use clap::Subcommand;
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{render_profiles, Formatter, OutputConfig};
use sc_core::{ConfigManager, Profile, ProfileManager};

/// Profile subcommands
#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// Add or update a profile
    Set(SetArgs),

    /// List configured profiles
    List,

    /// Remove a profile
    Remove(RemoveArgs),

    /// Make a profile the default for `browse`
    Default(RemoveArgs),
}

/// Arguments for the `profile set` command
#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Profile name (e.g., "local", "aws", "minio")
    pub name: String,

    /// S3 endpoint URL; omit for AWS
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Region
    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// Bucket lookup style: auto, path, or dns
    #[arg(long, default_value = "auto")]
    pub bucket_lookup: String,

    /// Access key ID
    #[arg(long, requires = "secret_key")]
    pub access_key: Option<String>,

    /// Secret access key
    #[arg(long, requires = "access_key")]
    pub secret_key: Option<String>,
}

/// Arguments naming one profile
#[derive(clap::Args, Debug)]
pub struct RemoveArgs {
    pub name: String,
}

/// Profile information for JSON output (without keys)
#[derive(Serialize)]
struct ProfileInfo {
    name: String,
    endpoint: Option<String>,
    region: String,
    bucket_lookup: String,
    static_credentials: bool,
    default: bool,
}

impl ProfileInfo {
    fn new(profile: &Profile, default: Option<&str>) -> Self {
        Self {
            name: profile.name.clone(),
            endpoint: profile.endpoint.clone(),
            region: profile.region.clone(),
            bucket_lookup: profile.bucket_lookup.clone(),
            static_credentials: profile.static_keys().is_some(),
            default: default == Some(profile.name.as_str()),
        }
    }
}

#[derive(Serialize)]
struct ProfileOperationOutput {
    success: bool,
    profile: String,
    message: String,
}

/// Execute a profile subcommand
pub fn execute(cmd: ProfileCommands, config_manager: ConfigManager, output: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output);

    match cmd {
        ProfileCommands::Set(args) => execute_set(args, config_manager, &formatter),
        ProfileCommands::List => execute_list(config_manager, &formatter),
        ProfileCommands::Remove(args) => execute_remove(&args.name, config_manager, &formatter),
        ProfileCommands::Default(args) => execute_default(&args.name, config_manager, &formatter),
    }
}

fn report(formatter: &Formatter, name: &str, message: String) {
    if formatter.is_json() {
        formatter.json(&ProfileOperationOutput {
            success: true,
            profile: name.to_string(),
            message,
        });
    } else {
        formatter.success(&message);
    }
}

fn profile_from_args(args: SetArgs) -> Profile {
    let mut profile = Profile::new(args.name);
    profile.endpoint = args.endpoint.filter(|e| !e.is_empty());
    profile.region = args.region;
    profile.bucket_lookup = args.bucket_lookup;
    profile.access_key = args.access_key;
    profile.secret_key = args.secret_key;
    profile
}

fn execute_set(args: SetArgs, config_manager: ConfigManager, formatter: &Formatter) -> ExitCode {
    let profile = profile_from_args(args);
    if let Err(e) = profile.validate() {
        formatter.error(&e.to_string());
        return ExitCode::UsageError;
    }

    let name = profile.name.clone();
    match ProfileManager::with_config_manager(config_manager).set(profile) {
        Ok(()) => {
            report(formatter, &name, format!("Profile '{name}' configured"));
            ExitCode::Success
        }
        Err(e) => {
            formatter.error(&e.to_string());
            ExitCode::for_error(&e)
        }
    }
}

fn execute_list(config_manager: ConfigManager, formatter: &Formatter) -> ExitCode {
    let config = match config_manager.load() {
        Ok(config) => config,
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::for_error(&e);
        }
    };
    let default = config.defaults.profile.as_deref();

    if formatter.is_json() {
        let profiles: Vec<ProfileInfo> = config
            .profiles
            .iter()
            .map(|p| ProfileInfo::new(p, default))
            .collect();
        formatter.json(&serde_json::json!({ "profiles": profiles }));
    } else if config.profiles.is_empty() {
        formatter.println("No profiles configured.");
    } else {
        formatter.println(&render_profiles(&config.profiles, default));
    }
    ExitCode::Success
}

fn execute_remove(name: &str, config_manager: ConfigManager, formatter: &Formatter) -> ExitCode {
    let manager = ProfileManager::with_config_manager(config_manager);
    match manager.remove(name) {
        Ok(()) => {
            report(formatter, name, format!("Profile '{name}' removed"));
            ExitCode::Success
        }
        Err(e) => {
            formatter.error(&e.to_string());
            ExitCode::for_error(&e)
        }
    }
}

fn execute_default(name: &str, config_manager: ConfigManager, formatter: &Formatter) -> ExitCode {
    let result = config_manager.load().and_then(|mut config| {
        if !config.profiles.iter().any(|p| p.name == name) {
            return Err(sc_core::Error::ProfileNotFound(name.to_string()));
        }
        config.defaults.profile = Some(name.to_string());
        config_manager.save(&config)
    });
    match result {
        Ok(()) => {
            report(formatter, name, format!("Profile '{name}' is now the default"));
            ExitCode::Success
        }
        Err(e) => {
            formatter.error(&e.to_string());
            ExitCode::for_error(&e)
        }
    }
}
