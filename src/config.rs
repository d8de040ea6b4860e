pub mod dispenser;
pub mod duration;

use crate::error::ConfigError;
use dispenser::Dispenser;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

pub use duration::parse_duration;

/// Values substituted when a directive's argument cannot be parsed
pub mod defaults {
    use std::time::Duration;

    pub const TABLE_PREFIX: &str = "coredns_";
    pub const TTL: u32 = 300;
    pub const FALLBACK_TTL: u32 = 360;
    pub const MAX_LIFETIME: Duration = Duration::from_secs(60);
    pub const MAX_OPEN_CONNECTIONS: i32 = 10;
    pub const MAX_IDLE_CONNECTIONS: i32 = 10;
    pub const ZONE_UPDATE_INTERVAL: Duration = Duration::from_secs(10 * 60);
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
}

const TABLE_SUFFIX: &str = "records";

/// What the plugin does when the record store fails during a query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreErrorPolicy {
    /// Answer with SERVFAIL
    #[default]
    ServFail,
    /// Hand the query to the next handler as if nothing matched
    FallThrough,
}

impl FromStr for StoreErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "servfail" => Ok(StoreErrorPolicy::ServFail),
            "fallthrough" | "next" => Ok(StoreErrorPolicy::FallThrough),
            other => Err(format!("Invalid store error policy: {}", other)),
        }
    }
}

/// Directives accepted inside the plugin block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Dsn,
    TablePrefix,
    MaxLifetime,
    MaxOpenConnections,
    MaxIdleConnections,
    ZoneUpdateInterval,
    Ttl,
    OnStoreError,
}

impl Directive {
    pub const ALL: [Directive; 8] = [
        Directive::Dsn,
        Directive::TablePrefix,
        Directive::MaxLifetime,
        Directive::MaxOpenConnections,
        Directive::MaxIdleConnections,
        Directive::ZoneUpdateInterval,
        Directive::Ttl,
        Directive::OnStoreError,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Directive::Dsn => "dsn",
            Directive::TablePrefix => "table_prefix",
            Directive::MaxLifetime => "max_lifetime",
            Directive::MaxOpenConnections => "max_open_connections",
            Directive::MaxIdleConnections => "max_idle_connections",
            Directive::ZoneUpdateInterval => "zone_update_interval",
            Directive::Ttl => "ttl",
            Directive::OnStoreError => "on_store_error",
        }
    }

    /// Apply the directive's argument to `config`.
    ///
    /// Returns the substituted default when the argument does not parse.
    fn apply(self, config: &mut SqlConfig, arg: &str) -> Option<ValueFallback> {
        let fallback = |default: String| ValueFallback {
            directive: self,
            value: arg.to_string(),
            default,
        };

        match self {
            Directive::Dsn => {
                config.dsn = arg.to_string();
                None
            }
            Directive::TablePrefix => {
                config.table_prefix = arg.to_string();
                None
            }
            Directive::MaxLifetime => match parse_duration(arg) {
                Some(value) => {
                    config.max_lifetime = value;
                    None
                }
                None => {
                    config.max_lifetime = defaults::MAX_LIFETIME;
                    Some(fallback(format!("{:?}", defaults::MAX_LIFETIME)))
                }
            },
            Directive::MaxOpenConnections => match arg.parse::<i32>() {
                Ok(value) => {
                    config.max_open_connections = value;
                    None
                }
                Err(_) => {
                    config.max_open_connections = defaults::MAX_OPEN_CONNECTIONS;
                    Some(fallback(defaults::MAX_OPEN_CONNECTIONS.to_string()))
                }
            },
            Directive::MaxIdleConnections => match arg.parse::<i32>() {
                Ok(value) => {
                    config.max_idle_connections = value;
                    None
                }
                Err(_) => {
                    config.max_idle_connections = defaults::MAX_IDLE_CONNECTIONS;
                    Some(fallback(defaults::MAX_IDLE_CONNECTIONS.to_string()))
                }
            },
            Directive::ZoneUpdateInterval => match parse_duration(arg) {
                Some(value) => {
                    config.zone_update_interval = value;
                    None
                }
                None => {
                    config.zone_update_interval = defaults::ZONE_UPDATE_INTERVAL;
                    Some(fallback(format!("{:?}", defaults::ZONE_UPDATE_INTERVAL)))
                }
            },
            Directive::Ttl => match arg.parse::<u32>() {
                Ok(value) => {
                    config.ttl = value;
                    None
                }
                Err(_) => {
                    config.ttl = defaults::FALLBACK_TTL;
                    Some(fallback(defaults::FALLBACK_TTL.to_string()))
                }
            },
            Directive::OnStoreError => match arg.parse::<StoreErrorPolicy>() {
                Ok(value) => {
                    config.on_store_error = value;
                    None
                }
                Err(_) => {
                    config.on_store_error = StoreErrorPolicy::default();
                    Some(fallback("servfail".to_string()))
                }
            },
        }
    }
}

impl FromStr for Directive {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Directive::ALL
            .into_iter()
            .find(|d| d.name() == s)
            .ok_or(())
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A directive whose argument did not parse and was replaced by its default
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueFallback {
    pub directive: Directive,
    pub value: String,
    pub default: String,
}

#[derive(Debug, Clone)]
pub struct SqlConfig {
    /// Connection string, `$VAR` / `${VAR}` are expanded when the pool is opened
    pub dsn: String,

    /// Prefix of the records table
    pub table_prefix: String,

    /// TTL for records that do not carry their own
    pub ttl: u32,

    /// Maximum lifetime of a pooled connection (zero = unlimited)
    pub max_lifetime: Duration,

    /// Maximum number of open connections (<= 0 = unlimited)
    pub max_open_connections: i32,

    /// Maximum number of idle connections kept around (<= 0 = none)
    pub max_idle_connections: i32,

    /// How often the zone list is reloaded (zero = never)
    pub zone_update_interval: Duration,

    /// How store failures are answered
    pub on_store_error: StoreErrorPolicy,

    /// Bound on the startup liveness probe
    pub probe_timeout: Duration,

    /// Directives that fell back to their defaults while parsing
    pub fallbacks: Vec<ValueFallback>,

    table_name: String,
}

impl Default for SqlConfig {
    fn default() -> Self {
        let mut config = Self {
            dsn: String::new(),
            table_prefix: defaults::TABLE_PREFIX.to_string(),
            ttl: defaults::TTL,
            max_lifetime: defaults::MAX_LIFETIME,
            max_open_connections: defaults::MAX_OPEN_CONNECTIONS,
            max_idle_connections: defaults::MAX_IDLE_CONNECTIONS,
            zone_update_interval: defaults::ZONE_UPDATE_INTERVAL,
            on_store_error: StoreErrorPolicy::default(),
            probe_timeout: defaults::PROBE_TIMEOUT,
            fallbacks: Vec::new(),
            table_name: String::new(),
        };
        config.finalize();
        config
    }
}

impl SqlConfig {
    /// Parse a plugin block such as `sqlite3 { dsn zones.db }`
    pub fn parse(block: &str) -> Result<Self, ConfigError> {
        let mut dispenser = Dispenser::new(block);
        Self::from_dispenser(&mut dispenser)
    }

    /// Parse from a dispenser positioned before the plugin name
    pub fn from_dispenser(d: &mut Dispenser) -> Result<Self, ConfigError> {
        let mut config = SqlConfig::default();

        if !d.next() {
            return Ok(config);
        }
        let plugin_line = d.line();

        let in_block = d.next_block();
        if !in_block && d.val() == "{" {
            return Err(ConfigError::UnterminatedBlock { line: plugin_line });
        }

        if in_block {
            loop {
                let token = d.val().to_string();
                if token == "}" {
                    break;
                }

                let directive =
                    token
                        .parse::<Directive>()
                        .map_err(|_| ConfigError::UnknownProperty {
                            token: token.clone(),
                            line: d.line(),
                        })?;

                if !d.next_arg() {
                    return Err(ConfigError::MissingArgument {
                        directive: token,
                        line: d.line(),
                    });
                }

                if let Some(fallback) = directive.apply(&mut config, d.val()) {
                    warn!(
                        "Invalid value '{}' for {}, using default {}",
                        fallback.value, fallback.directive, fallback.default
                    );
                    config.fallbacks.push(fallback);
                }

                if !d.next() {
                    return Err(ConfigError::UnterminatedBlock { line: plugin_line });
                }
            }
        }

        if let Some(extra) = d.peek() {
            return Err(ConfigError::UnexpectedToken {
                token: extra.text.clone(),
                line: extra.line,
            });
        }

        config.finalize();
        debug!(
            "Parsed sqlite3 config: table={}, ttl={}, max_open={}, max_idle={}, zone_update_interval={:?}",
            config.table_name,
            config.ttl,
            config.max_open_connections,
            config.max_idle_connections,
            config.zone_update_interval
        );
        Ok(config)
    }

    /// Recompute derived values. Called once parsing is done.
    pub fn finalize(&mut self) {
        self.table_name = format!("{}{}", self.table_prefix, TABLE_SUFFIX);
    }

    /// Name of the records table, `table_prefix + "records"`
    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SqlConfig::parse("sqlite3").unwrap();
        assert_eq!(config.dsn, "");
        assert_eq!(config.table_prefix, "coredns_");
        assert_eq!(config.table_name(), "coredns_records");
        assert_eq!(config.ttl, 300);
        assert_eq!(config.max_lifetime, Duration::from_secs(60));
        assert_eq!(config.max_open_connections, 10);
        assert_eq!(config.max_idle_connections, 10);
        assert_eq!(config.zone_update_interval, Duration::from_secs(600));
        assert_eq!(config.on_store_error, StoreErrorPolicy::ServFail);
        assert!(config.fallbacks.is_empty());
    }

    #[test]
    fn test_empty_input_yields_defaults() {
        let config = SqlConfig::parse("").unwrap();
        assert_eq!(config.table_name(), "coredns_records");
    }

    #[test]
    fn test_all_directives() {
        let config = SqlConfig::parse(
            r#"sqlite3 {
                dsn "sqlite:/var/lib/dns/zones.db"
                table_prefix dns_
                max_lifetime 5m
                max_open_connections 4
                max_idle_connections 2
                zone_update_interval 30s
                ttl 60
                on_store_error fallthrough
            }"#,
        )
        .unwrap();

        assert_eq!(config.dsn, "sqlite:/var/lib/dns/zones.db");
        assert_eq!(config.table_prefix, "dns_");
        assert_eq!(config.table_name(), "dns_records");
        assert_eq!(config.max_lifetime, Duration::from_secs(300));
        assert_eq!(config.max_open_connections, 4);
        assert_eq!(config.max_idle_connections, 2);
        assert_eq!(config.zone_update_interval, Duration::from_secs(30));
        assert_eq!(config.ttl, 60);
        assert_eq!(config.on_store_error, StoreErrorPolicy::FallThrough);
    }

    #[test]
    fn test_table_name_follows_prefix() {
        for prefix in ["", "a_", "zones_v2_", "x"] {
            let config =
                SqlConfig::parse(&format!("sqlite3 {{\n table_prefix \"{}\"\n}}", prefix))
                    .unwrap();
            assert_eq!(config.table_name(), format!("{}records", prefix));
        }
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let config = SqlConfig::parse(
            "sqlite3 {
                max_lifetime notaduration
                max_open_connections many
                max_idle_connections 1.5
                zone_update_interval soon
                ttl -1
                on_store_error explode
            }",
        )
        .unwrap();

        assert_eq!(config.max_lifetime, defaults::MAX_LIFETIME);
        assert_eq!(config.max_open_connections, defaults::MAX_OPEN_CONNECTIONS);
        assert_eq!(config.max_idle_connections, defaults::MAX_IDLE_CONNECTIONS);
        assert_eq!(config.zone_update_interval, defaults::ZONE_UPDATE_INTERVAL);
        assert_eq!(config.ttl, defaults::FALLBACK_TTL);
        assert_eq!(config.on_store_error, StoreErrorPolicy::ServFail);

        let directives: Vec<Directive> = config.fallbacks.iter().map(|f| f.directive).collect();
        assert_eq!(
            directives,
            vec![
                Directive::MaxLifetime,
                Directive::MaxOpenConnections,
                Directive::MaxIdleConnections,
                Directive::ZoneUpdateInterval,
                Directive::Ttl,
                Directive::OnStoreError,
            ]
        );
        assert_eq!(config.fallbacks[0].value, "notaduration");
    }

    #[test]
    fn test_non_positive_pool_values_pass_through() {
        let config = SqlConfig::parse(
            "sqlite3 {
                max_open_connections 0
                max_idle_connections -3
                max_lifetime 0
            }",
        )
        .unwrap();
        assert_eq!(config.max_open_connections, 0);
        assert_eq!(config.max_idle_connections, -3);
        assert_eq!(config.max_lifetime, Duration::ZERO);
        assert!(config.fallbacks.is_empty());
    }

    #[test]
    fn test_missing_argument() {
        let err = SqlConfig::parse("sqlite3 {\n dsn\n}").unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingArgument {
                directive: "dsn".to_string(),
                line: 2
            }
        );

        let err = SqlConfig::parse("sqlite3 { ttl }").unwrap_err();
        assert!(matches!(err, ConfigError::MissingArgument { directive, .. } if directive == "ttl"));
    }

    #[test]
    fn test_unknown_property() {
        let err = SqlConfig::parse("sqlite3 {\n dsn zones.db\n password hunter2\n}").unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownProperty {
                token: "password".to_string(),
                line: 3
            }
        );
        assert!(err.to_string().contains("unknown property 'password'"));
    }

    #[test]
    fn test_extra_argument_is_read_as_property() {
        let err = SqlConfig::parse("sqlite3 {\n ttl 60 120\n}").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProperty { token, .. } if token == "120"));
    }

    #[test]
    fn test_unterminated_block() {
        let err = SqlConfig::parse("sqlite3 {\n dsn zones.db").unwrap_err();
        assert_eq!(err, ConfigError::UnterminatedBlock { line: 1 });

        let err = SqlConfig::parse("sqlite3 {").unwrap_err();
        assert_eq!(err, ConfigError::UnterminatedBlock { line: 1 });
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        let err = SqlConfig::parse("sqlite3 extra").unwrap_err();
        assert!(matches!(err, ConfigError::UnexpectedToken { token, .. } if token == "extra"));
    }

    #[test]
    fn test_directive_table_is_complete() {
        for directive in Directive::ALL {
            assert_eq!(directive.name().parse::<Directive>(), Ok(directive));
        }
        assert!("DSN".parse::<Directive>().is_err());
    }
}
