use crate::mount::MountOptions;
use figment::{
    providers::{Env, Format, Json, Toml, YamlExtended},
    Figment,
};
use rocket::{
    config::Ident,
    data::{ByteUnit, Limits},
    Config,
};
use serde::{Deserialize, Serialize};
use std::{
    net::IpAddr,
    path::{Path, PathBuf},
};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppConfig {
    /// The address to bind the server to.
    pub address: Option<IpAddr>,
    /// The port to bind the server to.
    pub port: Option<u16>,
    /// The base path for temporary files. Write sessions are staged below it.
    #[serde(default = "std::env::temp_dir")]
    pub temp_base_path: PathBuf,
    /// Whether a `crc32` checksum sent on finish must match the assembled content.
    #[serde(default)]
    pub verify_write_checksums: bool,
    /// Seconds between two sweeps for abandoned write sessions. `0` disables the sweep.
    #[serde(default = "default_expired_write_session_removal_period")]
    pub expired_write_session_removal_period: u64,
    /// Seconds of inactivity after which a write session is considered abandoned.
    #[serde(default = "default_expired_write_session_expiration")]
    pub expired_write_session_expiration: u64,
    /// The limits for the application.
    pub limits: Option<AppLimit>,
    /// The storages to serve, registered in this order.
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
}

fn default_expired_write_session_removal_period() -> u64 {
    3600
}

fn default_expired_write_session_expiration() -> u64 {
    86400
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppLimit {
    pub form: Option<ByteUnit>,
    pub data_form: Option<ByteUnit>,
    pub file: Option<ByteUnit>,
    pub string: Option<ByteUnit>,
    pub bytes: Option<ByteUnit>,
    pub json: Option<ByteUnit>,
    pub msgpack: Option<ByteUnit>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MountConfig {
    /// Absolute virtual path the storage is mounted at.
    pub prefix: String,
    /// Storage id used for id based paths and restore keys.
    pub id: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub sharing_disabled: bool,
    #[serde(flatten)]
    pub driver: DriverConfig,
}

impl MountConfig {
    pub fn options(&self) -> MountOptions {
        MountOptions {
            read_only: self.read_only,
            sharing_disabled: self.sharing_disabled,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "driver", rename_all = "kebab-case")]
pub enum DriverConfig {
    /// A directory of the local filesystem.
    Local {
        root: PathBuf,
        /// Reported as the quota total. `0` is reported when absent.
        quota_bytes: Option<u64>,
    },
}

impl AppConfig {
    pub fn load(file_path: Option<impl AsRef<Path>>) -> Result<Self, figment::Error> {
        let mut figment = Figment::new().join(Env::raw().only(&[
            "address",
            "port",
            "temp_base_path",
            "verify_write_checksums",
            "expired_write_session_removal_period",
            "expired_write_session_expiration",
        ]));

        if let Some(file_path) = file_path {
            let file_path = file_path.as_ref();

            if !file_path.exists() {
                return Err(
                    format!("The given path `{}` is not exist.", file_path.display()).into(),
                );
            }

            match file_path.extension() {
                Some(ext) if ext.eq_ignore_ascii_case("json") => {
                    figment = figment.join(Json::file(file_path));
                }
                Some(ext)
                    if ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml") =>
                {
                    figment = figment.join(YamlExtended::file(file_path));
                }
                _ => {
                    figment = figment.join(Toml::file(file_path));
                }
            }
        }

        figment.extract()
    }

    /// Where write sessions keep their chunks.
    pub fn write_session_staging_path(&self) -> PathBuf {
        self.temp_base_path.join("write-sessions")
    }

    pub fn make_rocket_config(&self) -> Config {
        let mut config = Config::default();

        if let Some(address) = self.address {
            config.address = address;
        }

        if let Some(port) = self.port {
            config.port = port;
        }

        config.temp_dir = self.temp_base_path.clone().into();

        let mut limits = Limits::default();

        if let Some(app_limits) = &self.limits {
            if let Some(form) = app_limits.form {
                limits = limits.limit("form", form);
            }
            if let Some(data_form) = app_limits.data_form {
                limits = limits.limit("data-form", data_form);
            }
            if let Some(file) = app_limits.file {
                limits = limits.limit("file", file);
            }
            if let Some(string) = app_limits.string {
                limits = limits.limit("string", string);
            }
            if let Some(bytes) = app_limits.bytes {
                limits = limits.limit("bytes", bytes);
            }
            if let Some(json) = app_limits.json {
                limits = limits.limit("json", json);
            }
            if let Some(msgpack) = app_limits.msgpack {
                limits = limits.limit("msgpack", msgpack);
            }
        }

        config.limits = limits;
        config.ident = Ident::none();
        config.keep_alive = 60;

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test::TempDirDropper;

    #[test]
    fn test_default_configs_parse() {
        let dir = TempDirDropper::new();

        for (name, content) in [
            ("config.toml", include_str!("./config/default.toml")),
            ("config.json", include_str!("./config/default.json")),
            ("config.yaml", include_str!("./config/default.yaml")),
        ] {
            let path = dir.path().join(name);
            std::fs::write(&path, content).unwrap();

            let app_config = AppConfig::load(Some(&path)).unwrap();

            assert_eq!(app_config.expired_write_session_removal_period, 3600, "{}", name);
            assert_eq!(app_config.expired_write_session_expiration, 86400, "{}", name);
            assert!(!app_config.verify_write_checksums, "{}", name);
            assert_eq!(app_config.mounts.len(), 2, "{}", name);

            let home = &app_config.mounts[0];
            assert_eq!(home.prefix, "/home", "{}", name);
            assert_eq!(home.id, "home", "{}", name);
            assert_eq!(home.options(), MountOptions::default(), "{}", name);
            assert_eq!(
                home.driver,
                DriverConfig::Local {
                    root: PathBuf::from("./data/home"),
                    quota_bytes: Some(10737418240),
                },
                "{}",
                name
            );

            let archive = &app_config.mounts[1];
            assert!(archive.read_only, "{}", name);
            assert_eq!(
                archive.driver,
                DriverConfig::Local {
                    root: PathBuf::from("./data/archive"),
                    quota_bytes: None,
                },
                "{}",
                name
            );

            let rocket_config = app_config.make_rocket_config();
            assert_eq!(
                rocket_config.limits.get("file"),
                Some(ByteUnit::Gibibyte(1)),
                "{}",
                name
            );
        }
    }

    #[test]
    fn test_missing_file_is_rejected() {
        let dir = TempDirDropper::new();

        assert!(AppConfig::load(Some(dir.path().join("nope.toml"))).is_err());
    }
}
