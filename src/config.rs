//! Daemon configuration.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables prefixed with `HPCWATCH` using `__` as the section
//! separator (for example `HPCWATCH__METRICS__URL`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use hpcwatch_types::EntityUniverse;

const ENV_PREFIX: &str = "HPCWATCH";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub metrics: MetricsSettings,
    pub warehouse: WarehouseSettings,
    pub cache: CacheSettings,
    pub schedule: ScheduleSettings,
    pub cluster: ClusterSettings,
    pub log: LogSettings,
}

/// Metrics backend connection.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    pub url: String,
    pub timeout_ms: u64,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Bearer token. Takes precedence over basic credentials.
    pub token: Option<String>,
}

/// Job accounting warehouse connection.
#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseSettings {
    /// MySQL DSN. The aggregate job is only registered when this is set.
    pub url: Option<String>,
    pub schema: String,
    pub max_connections: u32,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub dir: PathBuf,
}

/// Refresh intervals, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleSettings {
    pub aggregate_secs: u64,
    pub hardware_secs: u64,
    pub power_secs: u64,
    pub overview_secs: u64,
    pub analytics_secs: u64,
}

/// The monitored node universe and history depths.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterSettings {
    pub node_prefix: String,
    pub node_count: usize,
    pub node_width: usize,
    pub status_depth: usize,
    pub power_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub level: String,
}

impl Settings {
    /// Load settings from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, environment())
    }

    fn load_with(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = defaults(Config::builder())?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        builder.add_source(env).build()?.try_deserialize()
    }

    /// Defaults only, ignoring files and the environment.
    pub fn defaults() -> Result<Self, ConfigError> {
        defaults(Config::builder())?.build()?.try_deserialize()
    }
}

impl MetricsSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl WarehouseSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ScheduleSettings {
    pub fn aggregate(&self) -> Duration {
        Duration::from_secs(self.aggregate_secs)
    }

    pub fn hardware(&self) -> Duration {
        Duration::from_secs(self.hardware_secs)
    }

    pub fn power(&self) -> Duration {
        Duration::from_secs(self.power_secs)
    }

    pub fn overview(&self) -> Duration {
        Duration::from_secs(self.overview_secs)
    }

    pub fn analytics(&self) -> Duration {
        Duration::from_secs(self.analytics_secs)
    }
}

impl ClusterSettings {
    pub fn universe(&self) -> EntityUniverse {
        EntityUniverse::numbered(&self.node_prefix, self.node_count, self.node_width)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

fn defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    builder
        .set_default("metrics.url", "http://localhost:9090")?
        .set_default("metrics.timeout_ms", 10_000)?
        .set_default("warehouse.schema", "modw")?
        .set_default("warehouse.max_connections", 10)?
        .set_default("warehouse.timeout_ms", 60_000)?
        .set_default("cache.dir", "./cache")?
        .set_default("schedule.aggregate_secs", 3_600)?
        .set_default("schedule.hardware_secs", 180)?
        .set_default("schedule.power_secs", 180)?
        .set_default("schedule.overview_secs", 60)?
        .set_default("schedule.analytics_secs", 300)?
        .set_default("cluster.node_prefix", "hopper-")?
        .set_default("cluster.node_count", 46)?
        .set_default("cluster.node_width", 2)?
        .set_default("cluster.status_depth", 5)?
        .set_default("cluster.power_depth", 3)?
        .set_default("log.level", "info")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_production_cluster() {
        let settings = Settings::defaults().unwrap();

        assert_eq!(settings.metrics.url, "http://localhost:9090");
        assert_eq!(settings.metrics.timeout(), Duration::from_secs(10));
        assert!(settings.metrics.token.is_none());
        assert!(settings.warehouse.url.is_none());
        assert_eq!(settings.warehouse.schema, "modw");
        assert_eq!(settings.schedule.aggregate(), Duration::from_secs(3_600));
        assert_eq!(settings.schedule.hardware(), Duration::from_secs(180));
        assert_eq!(settings.schedule.power(), Duration::from_secs(180));
        assert_eq!(settings.cluster.status_depth, 5);
        assert_eq!(settings.cluster.power_depth, 3);
        assert_eq!(settings.log.level, "info");

        let universe = settings.cluster.universe();
        assert_eq!(universe.len(), 46);
        assert_eq!(universe.names()[45], "hopper-46");
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[metrics]
url = "http://vm.internal:8428"
token = "secret"

[warehouse]
url = "mysql://xdmod@db/modw"

[cluster]
node_prefix = "gpu"
node_count = 8
node_width = 3
"#
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.metrics.url, "http://vm.internal:8428");
        assert_eq!(settings.metrics.token.as_deref(), Some("secret"));
        assert_eq!(settings.warehouse.url.as_deref(), Some("mysql://xdmod@db/modw"));
        // Untouched keys keep their defaults
        assert_eq!(settings.metrics.timeout_ms, 10_000);
        assert_eq!(settings.schedule.overview_secs, 60);

        let universe = settings.cluster.universe();
        assert_eq!(universe.len(), 8);
        assert_eq!(universe.names()[0], "gpu001");
        assert_eq!(universe.names()[7], "gpu008");
    }

    #[test]
    fn environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[metrics]
url = "http://vm.internal:8428"

[schedule]
power_secs = 120
"#
        )
        .unwrap();

        let mut vars = config::Map::new();
        vars.insert(
            "HPCWATCH__METRICS__URL".to_string(),
            "http://vm.override:8428".to_string(),
        );
        vars.insert("HPCWATCH__SCHEDULE__POWER_SECS".to_string(), "60".to_string());
        vars.insert("HPCWATCH__CLUSTER__NODE_COUNT".to_string(), "12".to_string());
        vars.insert("OTHER__METRICS__URL".to_string(), "http://ignored".to_string());

        let settings = Settings::load_with(Some(file.path()), environment().source(Some(vars))).unwrap();
        assert_eq!(settings.metrics.url, "http://vm.override:8428");
        assert_eq!(settings.schedule.power(), Duration::from_secs(60));
        assert_eq!(settings.cluster.universe().len(), 12);
        // File and defaults still fill everything else
        assert_eq!(settings.schedule.hardware_secs, 180);
        assert_eq!(settings.metrics.timeout_ms, 10_000);
    }

    #[test]
    fn unparsable_environment_value_is_an_error() {
        let mut vars = config::Map::new();
        vars.insert("HPCWATCH__SCHEDULE__POWER_SECS".to_string(), "soon".to_string());

        let result = Settings::load_with(None, environment().source(Some(vars)));
        assert!(result.is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = Settings::load(Some(Path::new("/nonexistent/hpcwatch.toml")));
        assert!(result.is_err());
    }
}
