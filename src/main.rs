mod config;
mod dto;
mod fairings;
mod guards;
mod logger;
mod mount;
mod mount_table;
mod routes;
mod services;
mod storage;
mod virtual_path;


use crate::{
    config::{AppConfig, DriverConfig, MountConfig},
    mount::Mount,
    mount_table::MountTable,
    services::WriteSessionService,
    storage::{local_file_system::LocalFileSystem, Storage, StorageError},
};
use clap::{Arg, ArgAction, Command, ValueHint};
use const_format::formatcp;
use dto::Error;
use rocket::{catch, catchers, http::Status, Build, Request, Rocket};
use std::{path::Path, sync::Arc};
use thiserror::Error;

fn cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(formatcp!(
            "{} ({} {})",
            env!("CARGO_PKG_VERSION"),
            env!("COMMIT_HASH"),
            env!("COMMIT_DATE")
        ))
        .args_conflicts_with_subcommands(true)
        .arg(
            Arg::new("config")
                .help("Path to the config file")
                .short('c')
                .long("config")
                .value_name("PATH")
                .value_hint(ValueHint::FilePath)
                .required(false)
                .allow_hyphen_values(true)
                .num_args(1),
        )
        .subcommand(
            Command::new("generate-config")
                .about("Generate a new config file")
                .long_about("Generate a new config file with the default values.")
                .arg(
                    Arg::new("config")
                        .help("Path to the config file")
                        .short('c')
                        .long("config")
                        .value_name("PATH")
                        .value_hint(ValueHint::FilePath)
                        .required(true)
                        .allow_hyphen_values(true)
                        .num_args(1),
                )
                .arg(
                    Arg::new("overwrite")
                        .help("Overwrite the file if it already exists")
                        .long("overwrite")
                        .action(ArgAction::SetTrue)
                ),
        )
        .subcommand(
            Command::new("test-config")
                .about("Print the config")
                .long_about("Print the config from the given file, including the mounts it declares.")
                .arg(
                    Arg::new("config")
                        .help("Path to the config file")
                        .short('c')
                        .long("config")
                        .value_name("PATH")
                        .value_hint(ValueHint::FilePath)
                        .required(false)
                        .allow_hyphen_values(true)
                        .num_args(1),
                ),
        )
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    IOError(#[from] std::io::Error),
    #[error("{0}")]
    RocketError(#[from] rocket::Error),
    #[error("{0}")]
    FigmentError(#[from] figment::Error),
    #[error("{0}")]
    StorageError(#[from] StorageError),
}

#[rocket::main]
async fn main() {
    let cli_matches = cli().get_matches();

    let result = match cli_matches.subcommand() {
        Some(("generate-config", sub_matches)) => {
            // `config` is a required argument, clap rejects the command without it
            match sub_matches.get_one::<String>("config") {
                Some(config_path) => {
                    generate_config(config_path, sub_matches.get_flag("overwrite"))
                }
                None => Ok(()),
            }
        }
        Some(("test-config", sub_matches)) => {
            let config_path = sub_matches.get_one::<String>("config");
            test_config(config_path)
        }
        _ => {
            let config_path = cli_matches.get_one::<String>("config");
            run_server(config_path).await
        }
    };

    // Humanize the message if it's an error.
    if let Err(err) = result {
        let mut err = err.to_string();

        if let Some(first) = err.chars().next() {
            if first.is_ascii_lowercase() {
                err = first.to_uppercase().to_string() + &err[1..];
            }
        }

        if let Some(last) = err.chars().last() {
            match last {
                '.' | '!' | '?' => {}
                _ => err.push('.'),
            }
        }

        eprintln!("Command failed.");
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn generate_config(config_path: impl AsRef<Path>, overwrite: bool) -> Result<(), AppError> {
    let config_path = config_path.as_ref();

    if config_path.exists() {
        if !overwrite {
            eprintln!("The file already exists. Use the `--overwrite` flag to overwrite it.");
            eprintln!("Configuration is not generated.");
            return Ok(());
        }

        println!("The file already exists. Overwriting it.");
    }

    const JSON_CONFIG: &str = include_str!("./config/default.json");
    const TOML_CONFIG: &str = include_str!("./config/default.toml");
    const YAML_CONFIG: &str = include_str!("./config/default.yaml");

    let (file_type, file_content) = match config_path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("json") => ("JSON", JSON_CONFIG),
        Some(ext) if ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml") => {
            ("YAML", YAML_CONFIG)
        }
        _ => ("TOML", TOML_CONFIG),
    };

    std::fs::write(config_path, file_content)?;

    let full_config_path = config_path.canonicalize()?;
    println!(
        "{} configuration has been generated at `{}`.",
        file_type,
        full_config_path.display()
    );

    Ok(())
}

fn test_config(config_path: Option<impl AsRef<Path> + Clone>) -> Result<(), AppError> {
    let app_config = AppConfig::load(config_path.clone())?;
    let rocket_config = app_config.make_rocket_config();

    if let Some(config_path) = &config_path {
        let config_path = config_path.as_ref().canonicalize()?;
        println!(
            "Configuration path has been set: `{}`",
            config_path.display()
        );
    }

    println!("Configuration has been loaded successfully.");

    println!("[Loaded Configuration]");
    println!("- address: {}", rocket_config.address);
    println!("- port: {}", rocket_config.port);
    println!("- temp_base_path: {}", app_config.temp_base_path.display());
    println!(
        "- write_session_staging_path: {}",
        app_config.write_session_staging_path().display()
    );
    println!(
        "- verify_write_checksums: {}",
        app_config.verify_write_checksums
    );

    println!("- limits:");
    for name in [
        "form", "data-form", "file", "string", "bytes", "json", "msgpack",
    ] {
        match rocket_config.limits.get(name) {
            Some(limit) => println!("    - {}: {}", name, limit),
            None => println!("    - {}: (unset)", name),
        }
    }

    println!(
        "- expired_write_session_removal_period: {}",
        app_config.expired_write_session_removal_period
    );
    println!(
        "- expired_write_session_expiration: {}",
        app_config.expired_write_session_expiration
    );

    println!("- mounts:");
    for mount in &app_config.mounts {
        println!("    - {} (id: {})", mount.prefix, mount.id);
        println!("        - read_only: {}", mount.read_only);
        println!("        - sharing_disabled: {}", mount.sharing_disabled);

        match &mount.driver {
            DriverConfig::Local { root, quota_bytes } => {
                println!("        - driver: local");
                println!("        - root: {}", root.display());
                match quota_bytes {
                    Some(quota_bytes) => println!("        - quota_bytes: {}", quota_bytes),
                    None => println!("        - quota_bytes: (unlimited)"),
                }
            }
        }
    }

    Ok(())
}

async fn run_server(config_path: Option<impl AsRef<Path> + Clone>) -> Result<(), AppError> {
    logger::setup_logger();

    let app_config = AppConfig::load(config_path.clone())?;
    let rocket = create_rocket_instance(&app_config)?;

    if let Some(config_path) = &config_path {
        let config_path = config_path.as_ref().canonicalize()?;
        let config_path = config_path.display().to_string();
        log::info!(target: "init", config_path; "Configuration path has been set.");
    }

    log::info!(target: "init", app_config:serde; "Configuration has been loaded.");

    let rocket = setup_rocket_instance(app_config, rocket, true).await?;
    let _rocket = rocket.launch().await?;

    Ok(())
}

/// Creates a new Rocket instance from the given configuration.
pub fn create_rocket_instance(app_config: &AppConfig) -> Result<Rocket<Build>, AppError> {
    let rocket_config = app_config.make_rocket_config();
    let rocket = Rocket::custom(rocket_config);
    Ok(rocket)
}

/// Builds a backend for every configured mount and registers them in order.
/// The first invalid or conflicting mount aborts startup.
pub async fn create_mount_table(mounts: &[MountConfig]) -> Result<Arc<MountTable>, AppError> {
    let mount_table = MountTable::new();

    for mount_config in mounts {
        let prefix = &mount_config.prefix;
        let storage_id = &mount_config.id;

        let backend: Arc<dyn Storage> = match &mount_config.driver {
            DriverConfig::Local { root, quota_bytes } => {
                log::info!(target: "init", prefix, storage_id, root:?, quota_bytes:?; "Creating local file system backend.");
                Arc::new(LocalFileSystem::new(root, *quota_bytes).await?)
            }
        };

        let mount = Mount::new(prefix, storage_id, mount_config.options(), backend);
        let mount = match mount {
            Ok(mount) => mount,
            Err(err) => {
                log::error!(target: "init", prefix, storage_id, err:err; "Invalid mount configuration.");
                return Err(err.into());
            }
        };

        mount_table.add_mount(mount)?;
    }

    Ok(mount_table)
}

/// Sets up the Rocket instance with the given configuration.
/// This function mounts the configured storages and creates the write session
/// staging area before registering the services and routes.
pub async fn setup_rocket_instance(
    app_config: AppConfig,
    rocket: Rocket<Build>,
    attach_fairings: bool,
) -> Result<Rocket<Build>, AppError> {
    let mount_table = create_mount_table(&app_config.mounts).await?;

    let staging_path = app_config.write_session_staging_path();
    let verify_checksums = app_config.verify_write_checksums;

    log::info!(target: "init", staging_path:?, verify_checksums; "Creating write session service.");
    let write_session_service =
        WriteSessionService::new(staging_path, verify_checksums, mount_table.clone()).await?;

    let rocket = rocket.register("/", catchers![default_catcher]);
    let rocket = services::register_services(rocket, mount_table, write_session_service);
    let rocket = routes::register_routes(rocket);

    let rocket = if attach_fairings {
        fairings::register_fairings(rocket, &app_config)
    } else {
        rocket
    };

    let rocket = rocket.manage(app_config);

    Ok(rocket)
}

#[catch(default)]
fn default_catcher(status: Status, _request: &Request) -> Error {
    status.into()
}
