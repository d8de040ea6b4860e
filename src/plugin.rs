use crate::config::{SqlConfig, StoreErrorPolicy};
use crate::dns::DNSPacket;
use crate::dns::enums::{DNSResourceClass, DNSResourceType, ResponseCode};
use crate::dns::question::DNSQuestion;
use crate::dns::resource::DNSResource;
use crate::error::{HandlerError, Result, SetupError, StoreError};
use crate::metrics::{PluginMetrics, QueryOutcome};
use crate::pool::DatabasePool;
use crate::refresh::ZoneRefresher;
use crate::zone::{RecordStore, SqlRecordStore, Zone, ZoneCache};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

pub const PLUGIN_NAME: &str = "sqlite3";

/// One link in the query handling chain
#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Some` when this link or one after it answered, `None` when nobody did
    async fn serve_dns(&self, query: &DNSPacket) -> Result<Option<DNSPacket>>;

    /// Release resources held by this link and the rest of the chain
    async fn shutdown(&self) {}
}

/// Terminal link. Answers nothing.
pub struct EndOfChain;

#[async_trait]
impl Handler for EndOfChain {
    fn name(&self) -> &'static str {
        "end"
    }

    async fn serve_dns(&self, _query: &DNSPacket) -> Result<Option<DNSPacket>> {
        Ok(None)
    }
}

pub type HandlerFactory = Box<dyn FnOnce(Box<dyn Handler>) -> Box<dyn Handler> + Send>;

/// Plugins registered by setup, composed into a chain once all are known
#[derive(Default)]
pub struct HandlerChain {
    factories: Vec<HandlerFactory>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin; `factory` receives the link that follows it
    pub fn add_plugin<F>(&mut self, factory: F)
    where
        F: FnOnce(Box<dyn Handler>) -> Box<dyn Handler> + Send + 'static,
    {
        self.factories.push(Box::new(factory));
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Compose the chain. The first registered plugin sees queries first.
    pub fn build(self) -> Box<dyn Handler> {
        self.factories
            .into_iter()
            .rev()
            .fold(Box::new(EndOfChain) as Box<dyn Handler>, |next, factory| {
                factory(next)
            })
    }
}

/// Everything a plugin instance owns apart from its successor
pub struct SqlBackend {
    config: SqlConfig,
    db: Option<DatabasePool>,
    store: Arc<dyn RecordStore>,
    zones: Arc<ZoneCache>,
    metrics: Arc<PluginMetrics>,
    refresher: ZoneRefresher,
}

impl SqlBackend {
    /// Open the database described by `config` and load the zone list
    pub async fn open(config: SqlConfig) -> std::result::Result<Self, SetupError> {
        let metrics = Arc::new(PluginMetrics::new()?);
        let db = DatabasePool::open(&config).await?;
        let store: Arc<dyn RecordStore> =
            Arc::new(SqlRecordStore::new(db.pool().clone(), config.table_name(), config.ttl));

        match Self::start(config, Some(db.clone()), store, metrics).await {
            Ok(backend) => Ok(backend),
            Err(e) => {
                db.close().await;
                Err(e)
            }
        }
    }

    /// Serve from an already built store instead of a database
    pub async fn with_store(
        config: SqlConfig,
        store: Arc<dyn RecordStore>,
    ) -> std::result::Result<Self, SetupError> {
        let metrics = Arc::new(PluginMetrics::new()?);
        Self::start(config, None, store, metrics).await
    }

    async fn start(
        config: SqlConfig,
        db: Option<DatabasePool>,
        store: Arc<dyn RecordStore>,
        metrics: Arc<PluginMetrics>,
    ) -> std::result::Result<Self, SetupError> {
        metrics.record_config_fallbacks(config.fallbacks.len());

        let zones = Arc::new(ZoneCache::new());
        let snapshot = zones.refresh(store.as_ref()).await?;
        metrics.record_refresh(Some(snapshot.len()));

        let refresher = ZoneRefresher::spawn(
            Arc::clone(&zones),
            Arc::clone(&store),
            Arc::clone(&metrics),
            config.zone_update_interval,
        );

        Ok(Self {
            config,
            db,
            store,
            zones,
            metrics,
            refresher,
        })
    }

    pub fn config(&self) -> &SqlConfig {
        &self.config
    }

    pub fn zones(&self) -> &Arc<ZoneCache> {
        &self.zones
    }

    pub fn metrics(&self) -> &Arc<PluginMetrics> {
        &self.metrics
    }

    pub fn database(&self) -> Option<&DatabasePool> {
        self.db.as_ref()
    }

    /// Answer records for `question` inside `zone`, empty if there are none
    async fn answer(
        &self,
        zone: &Zone,
        owner: &str,
        question: &DNSQuestion,
    ) -> Result<Vec<DNSResource>> {
        let mut records = self
            .store
            .lookup(&zone.stored, owner, question.qtype)
            .await?;

        if records.is_empty() && question.qtype != DNSResourceType::CNAME {
            records = self
                .store
                .lookup(&zone.stored, owner, DNSResourceType::CNAME)
                .await?;
        }

        records
            .iter()
            .map(|record| {
                record
                    .to_dns_resource(&question.labels, self.config.ttl)
                    .map_err(|e| HandlerError::Store(StoreError::MalformedRow(e)))
            })
            .collect()
    }

    async fn close(&self) {
        self.refresher.shutdown().await;
        if let Some(db) = &self.db {
            db.close().await;
        }
    }
}

/// Answers queries for the zones found in the records table
pub struct SqlPlugin {
    backend: SqlBackend,
    next: Box<dyn Handler>,
}

impl SqlPlugin {
    pub fn new(backend: SqlBackend, next: Box<dyn Handler>) -> Self {
        Self { backend, next }
    }

    pub fn backend(&self) -> &SqlBackend {
        &self.backend
    }

    async fn delegate(&self, query: &DNSPacket, outcome: QueryOutcome) -> Result<Option<DNSPacket>> {
        self.backend.metrics.record_query(outcome);
        self.next.serve_dns(query).await
    }
}

#[async_trait]
impl Handler for SqlPlugin {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    async fn serve_dns(&self, query: &DNSPacket) -> Result<Option<DNSPacket>> {
        let Some(question) = query.questions.first() else {
            return self.next.serve_dns(query).await;
        };

        if question.qclass != DNSResourceClass::IN
            || matches!(question.qtype, DNSResourceType::ANY | DNSResourceType::AXFR)
        {
            return self.next.serve_dns(query).await;
        }

        let qname = question.name();
        let snapshot = self.backend.zones.snapshot();
        let Some(zone) = snapshot.find_zone(&qname) else {
            debug!("{} is outside all zones, passing on", qname);
            return self.delegate(query, QueryOutcome::OutOfZone).await;
        };

        let owner = zone.relative_name(&qname);
        match self.backend.answer(zone, &owner, question).await {
            Ok(answers) if answers.is_empty() => {
                debug!("No {} records for {} in {}", question.qtype, qname, zone.stored);
                self.delegate(query, QueryOutcome::NotFound).await
            }
            Ok(answers) => {
                debug!(
                    "Answering {} {} with {} records from {}",
                    question.qtype,
                    qname,
                    answers.len(),
                    zone.stored
                );
                self.backend.metrics.record_query(QueryOutcome::Answered);
                Ok(Some(query.authoritative_answer(answers)))
            }
            Err(HandlerError::Store(e)) => {
                error!("Lookup of {} {} failed: {}", question.qtype, qname, e);
                self.backend.metrics.record_store_error();
                match self.backend.config.on_store_error {
                    StoreErrorPolicy::ServFail => {
                        self.backend.metrics.record_query(QueryOutcome::ServFail);
                        Ok(Some(query.response(ResponseCode::ServerFailure)))
                    }
                    StoreErrorPolicy::FallThrough => {
                        self.delegate(query, QueryOutcome::FallThrough).await
                    }
                }
            }
        }
    }

    async fn shutdown(&self) {
        self.backend.close().await;
        self.next.shutdown().await;
    }
}

/// Parse `block`, open the database and register one plugin into `chain`.
///
/// Nothing is registered when any step fails.
pub async fn setup(block: &str, chain: &mut HandlerChain) -> std::result::Result<(), SetupError> {
    let config = SqlConfig::parse(block).inspect_err(|e| error!("{}: {}", PLUGIN_NAME, e))?;
    let table = config.table_name().to_string();

    let backend = SqlBackend::open(config).await.inspect_err(|e| error!("{}", e))?;
    let zone_count = backend.zones.snapshot().len();

    chain.add_plugin(move |next| Box::new(SqlPlugin::new(backend, next)));
    info!(
        "{} plugin registered (table {}, {} zones)",
        PLUGIN_NAME, table, zone_count
    );
    Ok(())
}
