use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use aqc_broker_paper::PaperFillSimulator;
use aqc_config::DeskSettings;
use aqc_execution::{
    BookConfigStore, BookRoutingConfig, ExecutionRouter, SimulationParams, VenuePolicy,
};
use aqc_journal::{Journal, MemorySink};
use aqc_md::StaticPriceFeed;
use aqc_portfolio::InvestmentOrder;
use aqc_risk::RiskManager;
use aqc_runtime::{CycleReport, DeskParams, PoolSpec, TradingCycle, TradingDesk};
use aqc_schemas::{BookType, Decision, DecisionId, PoolId, StrategyId, UserId};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::{FakeLiveVenue, ScriptedDecisionSource};

pub type HarnessCycle = TradingCycle<
    Arc<FakeLiveVenue>,
    PaperFillSimulator,
    StaticPriceFeed,
    Arc<ScriptedDecisionSource>,
>;

/// 2026-03-02 09:00 UTC plus `minutes`. Scenario clock.
pub fn tick(minutes: i64) -> DateTime<Utc> {
    let start = Utc.timestamp_opt(1_772_442_000, 0).single().unwrap_or_default();
    start + chrono::Duration::minutes(minutes)
}

/// A desk with an in-memory journal, a scripted decision source, a fake
/// venue and a deterministic paper simulator (no delay, no slippage, full
/// fills), wired into one [`TradingCycle`].
pub struct Harness {
    pub desk: Arc<TradingDesk>,
    pub cycle: HarnessCycle,
    pub feed: StaticPriceFeed,
    pub source: Arc<ScriptedDecisionSource>,
    pub venue: Arc<FakeLiveVenue>,
    /// Shares its buffer with the desk journal.
    pub sink: MemorySink,
}

impl Harness {
    /// B-Book by default.
    pub fn new() -> Result<Self> {
        Self::with_default_book(BookType::B)
    }

    pub fn with_default_book(default_book: BookType) -> Result<Self> {
        let sink = MemorySink::default();
        let journal = Arc::new(Journal::new(sink.clone(), true));
        let desk = TradingDesk::new(
            DeskParams::default(),
            RiskManager::default(),
            Arc::clone(&journal),
        );
        let books = BookRoutingConfig {
            default_book,
            simulation: exact_fills(),
            ..BookRoutingConfig::default()
        };
        let policy = VenuePolicy {
            timeout: Duration::from_secs(2),
            confirm_attempts: 3,
            confirm_interval: Duration::from_millis(1),
        };
        Self::assemble(desk, journal, sink, books, policy)
    }

    /// Desk, pools, routing and venue policy as configured. The configured
    /// simulation parameters are used unchanged.
    pub fn from_settings(settings: &DeskSettings) -> Result<Self> {
        let sink = MemorySink::default();
        let journal = Arc::new(Journal::new(sink.clone(), settings.runtime.hash_chain));
        let desk = TradingDesk::from_settings(settings, Arc::clone(&journal), tick(0))
            .context("desk from settings")?;
        Self::assemble(
            desk,
            journal,
            sink,
            settings.book.clone(),
            settings.execution.policy(),
        )
    }

    fn assemble(
        desk: TradingDesk,
        journal: Arc<Journal>,
        sink: MemorySink,
        books: BookRoutingConfig,
        policy: VenuePolicy,
    ) -> Result<Self> {
        let desk = Arc::new(desk);
        let books = BookConfigStore::new(books).context("book routing config")?;
        let venue = Arc::new(FakeLiveVenue::new());
        let router = Arc::new(ExecutionRouter::new(
            Arc::clone(&venue),
            PaperFillSimulator::seeded(42),
            books,
            journal,
            policy,
        ));

        let feed = StaticPriceFeed::default();
        let source = Arc::new(ScriptedDecisionSource::new());
        let cycle = TradingCycle::new(Arc::clone(&desk), router, feed.clone(), Arc::clone(&source));

        Ok(Self {
            desk,
            cycle,
            feed,
            source,
            venue,
            sink,
        })
    }

    pub fn books(&self) -> &BookConfigStore {
        self.cycle.router().books()
    }

    pub fn journal(&self) -> &Arc<Journal> {
        self.desk.journal()
    }

    /// Register a pool trading `symbols` under `risk_profile`.
    pub fn add_pool(&self, strategy: &str, risk_profile: &str, symbols: &[&str]) -> Result<PoolId> {
        let pool_id = PoolId::new();
        self.desk
            .register_pool(
                PoolSpec {
                    pool_id,
                    strategy_id: StrategyId::new(strategy),
                    risk_profile: risk_profile.to_string(),
                    symbols: symbols.iter().map(|s| s.to_string()).collect(),
                },
                tick(0),
            )
            .with_context(|| format!("register pool {strategy}"))?;
        Ok(pool_id)
    }

    /// Fund `pool_id` with a new investor order.
    pub fn subscribe(&self, pool_id: PoolId, amount: Decimal, at: DateTime<Utc>) -> Result<InvestmentOrder> {
        let (order, _) = self
            .desk
            .open_subscription(pool_id, UserId::new("investor-1"), amount, at)
            .with_context(|| format!("subscribe {amount} to {pool_id}"))?;
        Ok(order)
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.feed.set(symbol, price);
    }

    pub async fn run(&self, pool_id: PoolId, at: DateTime<Utc>) -> Result<CycleReport> {
        self.cycle
            .run(pool_id, at)
            .await
            .with_context(|| format!("cycle {pool_id} at {at}"))
    }

    pub fn decision(&self, id: DecisionId) -> Result<Decision> {
        self.journal()
            .decision(id)
            .with_context(|| format!("decision {id} not journaled"))
    }

    /// The journal as written, one JSON record per line.
    pub fn journal_contents(&self) -> String {
        self.sink.contents()
    }
}

fn exact_fills() -> SimulationParams {
    SimulationParams {
        delay_ms_min: 0,
        delay_ms_max: 0,
        slippage_min: 0.0,
        slippage_max: 0.0,
        fill_rate: 1.0,
        ..SimulationParams::default()
    }
}
