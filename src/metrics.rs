use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder, opts};

/// How a query left the plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    Answered,
    NotFound,
    OutOfZone,
    ServFail,
    FallThrough,
}

impl QueryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOutcome::Answered => "answered",
            QueryOutcome::NotFound => "not_found",
            QueryOutcome::OutOfZone => "out_of_zone",
            QueryOutcome::ServFail => "servfail",
            QueryOutcome::FallThrough => "fallthrough",
        }
    }
}

/// Prometheus collectors for one plugin instance
pub struct PluginMetrics {
    registry: Registry,

    queries: IntCounterVec,
    store_errors: IntCounter,
    zone_refreshes: IntCounterVec,
    config_fallbacks: IntCounter,
    zones: IntGauge,
}

impl PluginMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let queries = IntCounterVec::new(
            opts!(
                "sqlzone_queries_total",
                "Total number of queries seen by the plugin, by outcome"
            ),
            &["outcome"],
        )?;

        let store_errors = IntCounter::with_opts(opts!(
            "sqlzone_store_errors_total",
            "Total number of failed record store calls"
        ))?;

        let zone_refreshes = IntCounterVec::new(
            opts!(
                "sqlzone_zone_refreshes_total",
                "Total number of zone list reloads, by result"
            ),
            &["result"],
        )?;

        let config_fallbacks = IntCounter::with_opts(opts!(
            "sqlzone_config_fallbacks_total",
            "Number of directive values replaced by their default"
        ))?;

        let zones = IntGauge::with_opts(opts!(
            "sqlzone_zones",
            "Number of zones in the current snapshot"
        ))?;

        registry.register(Box::new(queries.clone()))?;
        registry.register(Box::new(store_errors.clone()))?;
        registry.register(Box::new(zone_refreshes.clone()))?;
        registry.register(Box::new(config_fallbacks.clone()))?;
        registry.register(Box::new(zones.clone()))?;

        Ok(Self {
            registry,
            queries,
            store_errors,
            zone_refreshes,
            config_fallbacks,
            zones,
        })
    }

    pub fn record_query(&self, outcome: QueryOutcome) {
        self.queries.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn record_store_error(&self) {
        self.store_errors.inc();
    }

    /// Record a zone reload; on success also updates the zone gauge
    pub fn record_refresh(&self, zone_count: Option<usize>) {
        match zone_count {
            Some(count) => {
                self.zone_refreshes.with_label_values(&["ok"]).inc();
                self.zones.set(count as i64);
            }
            None => self.zone_refreshes.with_label_values(&["error"]).inc(),
        }
    }

    pub fn record_config_fallbacks(&self, count: usize) {
        self.config_fallbacks.inc_by(count as u64);
    }

    pub fn queries(&self, outcome: QueryOutcome) -> u64 {
        self.queries.with_label_values(&[outcome.as_str()]).get()
    }

    pub fn store_errors(&self) -> u64 {
        self.store_errors.get()
    }

    pub fn zones(&self) -> i64 {
        self.zones.get()
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}
