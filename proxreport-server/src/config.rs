use std::{collections::HashSet, net::IpAddr, path::PathBuf};

use confique::Config;
use proxreport_core::{CapacityConfig, CapacityProfile, Configuration, Thresholds};
use serde::Deserialize;

#[derive(Config, Debug)]
pub struct Conf {
    /// Mountpoints to report on, in display order
    #[config(default = ["/"])]
    pub mountpoints: Vec<String>,

    #[config(nested)]
    pub server: ServerConf,

    #[config(nested)]
    pub thresholds: ThresholdConf,

    #[config(nested)]
    pub capacity: CapacityConf,

    /// Other cluster members shown on the cluster overview
    #[config(default = [])]
    pub peers: Vec<PeerConf>,
}

#[derive(Config, Debug, Clone)]
pub struct ServerConf {
    /// Bind address
    #[config(default = "0.0.0.0", env = "PROXREPORT_ADDRESS")]
    pub address: IpAddr,

    /// Plain HTTP port, redirects to HTTPS when TLS is configured
    #[config(default = 8080, env = "PROXREPORT_HTTP_PORT")]
    pub http_port: u16,

    /// HTTPS port
    #[config(default = 8443, env = "PROXREPORT_HTTPS_PORT")]
    pub https_port: u16,

    /// PEM certificate chain
    #[config(env = "PROXREPORT_CERTFILE")]
    pub certfile: Option<PathBuf>,

    /// PEM PKCS#8 private key
    #[config(env = "PROXREPORT_KEYFILE")]
    pub keyfile: Option<PathBuf>,

    /// File with one `username:password-hash` per line
    #[config(default = "users.txt", env = "PROXREPORT_USERS_FILE")]
    pub users_file: PathBuf,

    /// Dashboard refresh interval in seconds
    #[config(default = 10)]
    pub autorefresh_seconds: u64,
}

#[derive(Config, Debug)]
pub struct ThresholdConf {
    #[config(default = 70)]
    pub cpu_warn: u8,
    #[config(default = 90)]
    pub cpu_crit: u8,
    #[config(default = 75)]
    pub ram_warn: u8,
    #[config(default = 90)]
    pub ram_crit: u8,
    #[config(default = 80)]
    pub disk_warn: u8,
    #[config(default = 90)]
    pub disk_crit: u8,
}

#[derive(Config, Debug)]
pub struct CapacityConf {
    /// Cores kept free for the host
    #[config(default = 1.0)]
    pub reserve_cores: f64,
    /// RAM kept free for the host, MiB
    #[config(default = 2048.0)]
    pub reserve_ram_mb: f64,
    /// Disk kept free for the host, GiB
    #[config(default = 20.0)]
    pub reserve_disk_gb: f64,

    pub standard: ProfileConf,
    pub light: ProfileConf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConf {
    pub name: String,
    pub vcpus: u32,
    pub ram_mb: u32,
    pub disk_gb: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeerConf {
    pub name: String,
    /// Base URL of the peer, e.g. `https://pve-node02:8443`
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

pub struct TlsFiles {
    pub certfile: PathBuf,
    pub keyfile: PathBuf,
}

/// Everything the server needs, validated once at startup.
pub struct Settings {
    pub report: Configuration,
    pub server: ServerConf,
    pub peers: Vec<PeerConf>,
}

impl Settings {
    pub fn tls(&self) -> Option<TlsFiles> {
        match (&self.server.certfile, &self.server.keyfile) {
            (Some(certfile), Some(keyfile)) => Some(TlsFiles {
                certfile: certfile.clone(),
                keyfile: keyfile.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{metric} thresholds must satisfy warn < crit <= 100, got warn={warn} crit={crit}")]
    Thresholds {
        metric: &'static str,
        warn: u8,
        crit: u8,
    },
    #[error("{0} must be a finite, non-negative number")]
    Reserve(&'static str),
    #[error("profile '{0}' needs a name and vcpus, ram_mb and disk_gb of at least 1")]
    Profile(String),
    #[error("at least one mountpoint must be configured")]
    NoMountpoints,
    #[error("mountpoint '{0}' is configured twice")]
    DuplicateMountpoint(String),
    #[error("peer '{0}' is configured twice")]
    DuplicatePeer(String),
    #[error("certfile and keyfile must be given together")]
    PartialTls,
}

pub fn load(path: &str) -> anyhow::Result<Settings> {
    let conf = Conf::builder().env().file(path).load()?;
    tracing::trace!("using config {:?}", conf);
    Ok(Settings::try_from(conf)?)
}

impl TryFrom<Conf> for Settings {
    type Error = ConfigError;

    fn try_from(conf: Conf) -> Result<Self, Self::Error> {
        let thresholds = validate_thresholds(&conf.thresholds)?;
        let capacity = validate_capacity(conf.capacity)?;

        if conf.mountpoints.is_empty() {
            return Err(ConfigError::NoMountpoints);
        }
        let mut seen = HashSet::new();
        if let Some(dup) = conf.mountpoints.iter().find(|m| !seen.insert(m.as_str())) {
            return Err(ConfigError::DuplicateMountpoint(dup.clone()));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = conf.peers.iter().find(|p| !seen.insert(p.name.as_str())) {
            return Err(ConfigError::DuplicatePeer(dup.name.clone()));
        }

        if conf.server.certfile.is_some() != conf.server.keyfile.is_some() {
            return Err(ConfigError::PartialTls);
        }

        Ok(Settings {
            report: Configuration {
                thresholds,
                capacity,
                mountpoints: conf.mountpoints,
            },
            server: conf.server,
            peers: conf.peers,
        })
    }
}

fn validate_thresholds(conf: &ThresholdConf) -> Result<Thresholds, ConfigError> {
    for (metric, warn, crit) in [
        ("cpu", conf.cpu_warn, conf.cpu_crit),
        ("ram", conf.ram_warn, conf.ram_crit),
        ("disk", conf.disk_warn, conf.disk_crit),
    ] {
        if warn >= crit || crit > 100 {
            return Err(ConfigError::Thresholds { metric, warn, crit });
        }
    }

    Ok(Thresholds {
        cpu_warn: conf.cpu_warn,
        cpu_crit: conf.cpu_crit,
        ram_warn: conf.ram_warn,
        ram_crit: conf.ram_crit,
        disk_warn: conf.disk_warn,
        disk_crit: conf.disk_crit,
    })
}

fn validate_capacity(conf: CapacityConf) -> Result<CapacityConfig, ConfigError> {
    for (name, value) in [
        ("reserve_cores", conf.reserve_cores),
        ("reserve_ram_mb", conf.reserve_ram_mb),
        ("reserve_disk_gb", conf.reserve_disk_gb),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::Reserve(name));
        }
    }

    Ok(CapacityConfig {
        reserve_cores: conf.reserve_cores,
        reserve_ram_mb: conf.reserve_ram_mb,
        reserve_disk_gb: conf.reserve_disk_gb,
        standard: validate_profile(conf.standard)?,
        light: validate_profile(conf.light)?,
    })
}

fn validate_profile(conf: ProfileConf) -> Result<CapacityProfile, ConfigError> {
    if conf.name.trim().is_empty() || conf.vcpus == 0 || conf.ram_mb == 0 || conf.disk_gb == 0 {
        return Err(ConfigError::Profile(conf.name));
    }

    Ok(CapacityProfile {
        name: conf.name,
        vcpus: conf.vcpus,
        ram_mb: conf.ram_mb,
        disk_gb: conf.disk_gb,
    })
}
