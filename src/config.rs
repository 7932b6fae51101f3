use crate::error::ConfigError;
use crate::model::fqdn;
use crate::resolver::ResolverEndpoint;
use crate::store::InfluxSettings;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the per-user and per-directory config file.
pub const CONFIG_FILE_NAME: &str = ".dnskeyage";

pub const DEFAULT_PORT: u16 = 53;

const RESOLV_CONF: &str = "/etc/resolv.conf";

#[derive(Parser, Debug, Default)]
#[command(
    name = "dnskeyage",
    version,
    about = "Record how long each DNSKEY of a zone has been published"
)]
pub struct Cli {
    /// Filename to read configuration from
    #[arg(long = "conf", value_name = "FILE")]
    pub conf: Option<PathBuf>,

    /// Nothing will be written to InfluxDB
    #[arg(long)]
    pub dryrun: bool,

    /// Print lots of runtime information
    #[arg(short, long)]
    pub verbose: bool,

    /// Zone to compute DNSKEY age for (repeatable)
    #[arg(long = "zone", value_name = "ZONE")]
    pub zones: Vec<String>,

    /// Resolver name or IP, tried in the given order (repeatable)
    #[arg(long = "resolver", value_name = "HOST")]
    pub resolvers: Vec<String>,

    /// Port used for every resolver
    #[arg(long)]
    pub port: Option<u16>,

    /// InfluxDB base URL, e.g. http://localhost:8086
    #[arg(long)]
    pub influx_server: Option<String>,

    /// Name of the InfluxDB database
    #[arg(long)]
    pub influx_db: Option<String>,

    #[arg(long)]
    pub influx_user: Option<String>,

    #[arg(long)]
    pub influx_passwd: Option<String>,

    /// Number of zones processed at the same time
    #[arg(long)]
    pub concurrency: Option<usize>,
}

impl Cli {
    pub fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            dryrun: self.dryrun,
            verbose: self.verbose,
            resolvers: self.resolvers.clone(),
            zones: self.zones.clone(),
            port: self.port,
            influx_server: self.influx_server.clone(),
            influx_db: self.influx_db.clone(),
            influx_user: self.influx_user.clone(),
            influx_passwd: self.influx_passwd.clone(),
            concurrency: self.concurrency,
        }
    }
}

/// One source of settings. Layers are merged oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub dryrun: bool,
    pub verbose: bool,
    pub resolvers: Vec<String>,
    pub zones: Vec<String>,
    pub port: Option<u16>,
    pub influx_server: Option<String>,
    pub influx_db: Option<String>,
    pub influx_user: Option<String>,
    pub influx_passwd: Option<String>,
    pub concurrency: Option<usize>,
}

impl ConfigLayer {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&source, path)
    }

    /// Like [`ConfigLayer::from_file`], but a missing file is not an error.
    pub fn from_optional_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(source) => Self::from_toml(&source, path).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ConfigError::Read {
                path: path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn from_toml(source: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Store settings from `DNSKEYAGE_INFLUX_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());
        ConfigLayer {
            influx_server: var("DNSKEYAGE_INFLUX_SERVER"),
            influx_db: var("DNSKEYAGE_INFLUX_DB"),
            influx_user: var("DNSKEYAGE_INFLUX_USER"),
            influx_passwd: var("DNSKEYAGE_INFLUX_PASSWD"),
            ..Default::default()
        }
    }

    /// Combine with a newer layer: flags are ORed, non-empty lists and set
    /// values of `newer` replace ours.
    pub fn merge(self, newer: ConfigLayer) -> ConfigLayer {
        fn pick_list(old: Vec<String>, new: Vec<String>) -> Vec<String> {
            if new.is_empty() { old } else { new }
        }
        fn pick_str(old: Option<String>, new: Option<String>) -> Option<String> {
            new.filter(|v| !v.is_empty()).or(old)
        }

        ConfigLayer {
            dryrun: self.dryrun || newer.dryrun,
            verbose: self.verbose || newer.verbose,
            resolvers: pick_list(self.resolvers, newer.resolvers),
            zones: pick_list(self.zones, newer.zones),
            port: newer.port.or(self.port),
            influx_server: pick_str(self.influx_server, newer.influx_server),
            influx_db: pick_str(self.influx_db, newer.influx_db),
            influx_user: pick_str(self.influx_user, newer.influx_user),
            influx_passwd: pick_str(self.influx_passwd, newer.influx_passwd),
            concurrency: newer.concurrency.or(self.concurrency),
        }
    }

    /// Validate and freeze. `system_resolvers` supplies resolvers when none
    /// were configured.
    pub fn into_run_config(
        self,
        system_resolvers: impl FnOnce() -> Vec<String>,
    ) -> Result<RunConfig, ConfigError> {
        let resolvers = if self.resolvers.is_empty() {
            system_resolvers()
        } else {
            self.resolvers
        };
        if resolvers.is_empty() {
            return Err(ConfigError::NoResolvers);
        }
        if self.zones.is_empty() {
            return Err(ConfigError::NoZones);
        }

        let concurrency = self.concurrency.unwrap_or(1);
        if concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency(concurrency));
        }

        let credentials_complete = self.influx_user.is_some() == self.influx_passwd.is_some();
        if !self.dryrun && !credentials_complete {
            return Err(ConfigError::IncompleteCredentials);
        }
        let store = match (self.influx_server, self.influx_db) {
            // A dry run with a store still reads history, so it needs valid credentials too
            (Some(_), Some(_)) if !credentials_complete => {
                return Err(ConfigError::IncompleteCredentials);
            }
            (Some(server), Some(database)) => Some(InfluxSettings {
                server,
                database,
                user: self.influx_user,
                password: self.influx_passwd,
            }),
            _ if self.dryrun => None,
            (None, _) => return Err(ConfigError::MissingInfluxServer),
            (Some(_), None) => return Err(ConfigError::MissingInfluxDb),
        };

        let port = self.port.unwrap_or(DEFAULT_PORT);
        Ok(RunConfig {
            zones: self.zones.iter().map(|z| fqdn(z)).collect(),
            resolvers: resolvers
                .into_iter()
                .map(|host| ResolverEndpoint::new(host, port))
                .collect(),
            dry_run: self.dryrun,
            verbose: self.verbose,
            concurrency,
            store,
        })
    }
}

/// Validated, immutable settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Fully-qualified zone names, in processing order
    pub zones: Vec<String>,
    pub resolvers: Vec<ResolverEndpoint>,
    pub dry_run: bool,
    pub verbose: bool,
    pub concurrency: usize,
    /// Absent only for dry runs without a configured store
    pub store: Option<InfluxSettings>,
}

impl RunConfig {
    /// Merge defaults, config files, environment and command line, then
    /// validate.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut layer = ConfigLayer::default();

        for path in default_config_paths() {
            if let Some(file_layer) = ConfigLayer::from_optional_file(&path)? {
                debug!("Loaded config from {}", path.display());
                layer = layer.merge(file_layer);
            }
        }
        if let Some(path) = &cli.conf {
            layer = layer.merge(ConfigLayer::from_file(path)?);
        }

        layer
            .merge(ConfigLayer::from_env())
            .merge(cli.layer())
            .into_run_config(system_resolvers)
    }
}

/// `~/.dnskeyage` followed by `./.dnskeyage`.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(home) = std::env::var("HOME") {
        paths.push(Path::new(&home).join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from(CONFIG_FILE_NAME));
    paths
}

/// Nameservers from the system resolver configuration.
pub fn system_resolvers() -> Vec<String> {
    std::fs::read_to_string(RESOLV_CONF)
        .map(|content| parse_resolv_conf(&content))
        .unwrap_or_default()
}

pub fn parse_resolv_conf(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.split(['#', ';']).next().unwrap_or("").trim())
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some("nameserver"), Some(addr)) => {
                    // Drop any IPv6 zone suffix
                    Some(addr.split('%').next().unwrap_or(addr).to_string())
                }
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_layer() -> ConfigLayer {
        ConfigLayer {
            zones: vec!["example.com".to_string()],
            resolvers: vec!["192.0.2.53".to_string()],
            influx_server: Some("http://localhost:8086".to_string()),
            influx_db: Some("dns".to_string()),
            ..Default::default()
        }
    }

    fn no_system_resolvers() -> Vec<String> {
        Vec::new()
    }

    #[test]
    fn test_valid_config() {
        let config = valid_layer().into_run_config(no_system_resolvers).unwrap();
        assert_eq!(config.zones, vec!["example.com."]);
        assert_eq!(config.resolvers, vec![ResolverEndpoint::new("192.0.2.53", 53)]);
        assert_eq!(config.concurrency, 1);
        assert!(!config.dry_run);
        let store = config.store.unwrap();
        assert_eq!(store.database, "dns");
        assert!(store.user.is_none());
    }

    #[test]
    fn test_missing_zones() {
        let layer = ConfigLayer {
            zones: vec![],
            ..valid_layer()
        };
        assert!(matches!(
            layer.into_run_config(no_system_resolvers),
            Err(ConfigError::NoZones)
        ));
    }

    #[test]
    fn test_system_resolvers_fallback() {
        let layer = ConfigLayer {
            resolvers: vec![],
            port: Some(5353),
            ..valid_layer()
        };
        let config = layer
            .into_run_config(|| vec!["127.0.0.53".to_string()])
            .unwrap();
        assert_eq!(config.resolvers, vec![ResolverEndpoint::new("127.0.0.53", 5353)]);

        let layer = ConfigLayer {
            resolvers: vec![],
            ..valid_layer()
        };
        assert!(matches!(
            layer.into_run_config(no_system_resolvers),
            Err(ConfigError::NoResolvers)
        ));
    }

    #[test]
    fn test_store_required_unless_dry_run() {
        let layer = ConfigLayer {
            influx_server: None,
            ..valid_layer()
        };
        assert!(matches!(
            layer.clone().into_run_config(no_system_resolvers),
            Err(ConfigError::MissingInfluxServer)
        ));

        let dry = ConfigLayer {
            dryrun: true,
            ..layer
        };
        let config = dry.into_run_config(no_system_resolvers).unwrap();
        assert!(config.dry_run);
        assert!(config.store.is_none());

        let layer = ConfigLayer {
            influx_db: None,
            ..valid_layer()
        };
        assert!(matches!(
            layer.into_run_config(no_system_resolvers),
            Err(ConfigError::MissingInfluxDb)
        ));
    }

    #[test]
    fn test_credentials_both_or_neither() {
        let layer = ConfigLayer {
            influx_user: Some("writer".to_string()),
            ..valid_layer()
        };
        assert!(matches!(
            layer.into_run_config(no_system_resolvers),
            Err(ConfigError::IncompleteCredentials)
        ));

        let layer = ConfigLayer {
            influx_user: Some("writer".to_string()),
            influx_passwd: Some("secret".to_string()),
            ..valid_layer()
        };
        let store = layer.into_run_config(no_system_resolvers).unwrap().store.unwrap();
        assert_eq!(store.user.as_deref(), Some("writer"));
        assert_eq!(store.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_dry_run_store_needs_complete_credentials() {
        let layer = ConfigLayer {
            dryrun: true,
            influx_passwd: Some("secret".to_string()),
            ..valid_layer()
        };
        assert!(matches!(
            layer.into_run_config(no_system_resolvers),
            Err(ConfigError::IncompleteCredentials)
        ));

        // Without a store there is nothing to authenticate against
        let layer = ConfigLayer {
            dryrun: true,
            influx_server: None,
            influx_user: Some("writer".to_string()),
            ..valid_layer()
        };
        let config = layer.into_run_config(no_system_resolvers).unwrap();
        assert!(config.store.is_none());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let layer = ConfigLayer {
            concurrency: Some(0),
            ..valid_layer()
        };
        assert!(matches!(
            layer.into_run_config(no_system_resolvers),
            Err(ConfigError::InvalidConcurrency(0))
        ));
    }

    #[test]
    fn test_merge_rules() {
        let old = ConfigLayer {
            dryrun: true,
            zones: vec!["a.example".to_string()],
            resolvers: vec!["192.0.2.1".to_string()],
            port: Some(5353),
            influx_server: Some("http://old:8086".to_string()),
            influx_db: Some("dns".to_string()),
            ..Default::default()
        };
        let newer = ConfigLayer {
            verbose: true,
            zones: vec!["b.example".to_string(), "c.example".to_string()],
            influx_server: Some("http://new:8086".to_string()),
            influx_db: Some(String::new()),
            ..Default::default()
        };

        let merged = old.merge(newer);
        assert!(merged.dryrun);
        assert!(merged.verbose);
        assert_eq!(merged.zones, vec!["b.example", "c.example"]);
        assert_eq!(merged.resolvers, vec!["192.0.2.1"]);
        assert_eq!(merged.port, Some(5353));
        assert_eq!(merged.influx_server.as_deref(), Some("http://new:8086"));
        assert_eq!(merged.influx_db.as_deref(), Some("dns"));
    }

    #[test]
    fn test_toml_layer() {
        let layer = ConfigLayer::from_toml(
            r#"
                zones = ["example.com", "example.net"]
                resolvers = ["192.0.2.53"]
                port = 5353
                influx_server = "http://localhost:8086"
                influx_db = "dns"
                dryrun = true
            "#,
            Path::new("inline"),
        )
        .unwrap();
        assert_eq!(layer.zones.len(), 2);
        assert_eq!(layer.port, Some(5353));
        assert!(layer.dryrun);
        assert!(!layer.verbose);

        assert!(ConfigLayer::from_toml("zone = [\"typo\"]", Path::new("inline")).is_err());
    }

    #[test]
    fn test_env_layer() {
        let layer = ConfigLayer::from_env_with(|name| match name {
            "DNSKEYAGE_INFLUX_SERVER" => Some("http://env:8086".to_string()),
            "DNSKEYAGE_INFLUX_USER" => Some(String::new()),
            _ => None,
        });
        assert_eq!(layer.influx_server.as_deref(), Some("http://env:8086"));
        assert!(layer.influx_user.is_none());
        assert!(layer.zones.is_empty());
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "dnskeyage",
            "--zone",
            "example.com",
            "--zone",
            "example.net",
            "--resolver",
            "192.0.2.1",
            "--resolver",
            "192.0.2.2",
            "--port",
            "5353",
            "--dryrun",
            "-v",
            "--influx-server",
            "http://localhost:8086",
        ])
        .unwrap();

        let layer = cli.layer();
        assert_eq!(layer.zones, vec!["example.com", "example.net"]);
        assert_eq!(layer.resolvers, vec!["192.0.2.1", "192.0.2.2"]);
        assert_eq!(layer.port, Some(5353));
        assert!(layer.dryrun);
        assert!(layer.verbose);
        assert_eq!(layer.influx_server.as_deref(), Some("http://localhost:8086"));
    }

    #[test]
    fn test_parse_resolv_conf() {
        let content = "\
# generated
search example.com
nameserver 192.0.2.1
nameserver   2001:db8::53 # secondary
nameserver fe80::1%eth0
;nameserver 192.0.2.99
options edns0
";
        assert_eq!(
            parse_resolv_conf(content),
            vec!["192.0.2.1", "2001:db8::53", "fe80::1"]
        );
    }
}
