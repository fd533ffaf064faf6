use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use aqc_journal::{
    verify_hash_chain, Journal, JournalEntry, JournalRecord, MemorySink, StatsFilter, TradeFilter,
    VerifyResult,
};
use aqc_schemas::{BookType, DecisionId, PoolId};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "aqc")]
#[command(about = "AI Quant Trading Core CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> pools ...)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Validate layered config and print the pools it declares
    ConfigCheck {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Print the resolved risk profiles (built-ins plus configured ones)
    Profiles {
        paths: Vec<PathBuf>,
    },

    /// Decision/trade journal utilities
    Journal {
        #[command(subcommand)]
        cmd: JournalCmd,
    },

    /// Persisted pool state
    Pool {
        #[command(subcommand)]
        cmd: PoolCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum JournalCmd {
    /// Verify the hash chain of a JSONL journal.
    Verify { path: PathBuf },

    /// Aggregate decision statistics.
    Stats {
        path: PathBuf,
        #[arg(long)]
        pool_id: Option<PoolId>,
        /// A or B
        #[arg(long, value_parser = parse_book)]
        book: Option<BookType>,
    },

    /// Trade history, newest first.
    Trades {
        path: PathBuf,
        #[arg(long)]
        pool_id: Option<PoolId>,
        #[arg(long, value_parser = parse_book)]
        book: Option<BookType>,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Mirror a journal into Postgres. Safe to re-run; the pools must
    /// already have been saved.
    ExportDb { path: PathBuf },
}

#[derive(Subcommand)]
enum PoolCmd {
    /// Print a pool with its orders and shares from Postgres.
    Show {
        #[arg(long)]
        pool_id: PoolId,
    },

    /// Print a pool's persisted decisions, latest trades and daily risk.
    History {
        #[arg(long)]
        pool_id: PoolId,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = aqc_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = aqc_db::status(&pool).await?;
                    println!("db_ok={} has_pools_table={}", s.ok, s.has_pools_table);
                }
                DbCmd::Migrate => {
                    info!("applying migrations");
                    aqc_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let loaded = aqc_config::load_layered_yaml(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::ConfigCheck { paths } => {
            let loaded = aqc_config::load_layered_yaml(&paths)?;
            let settings = loaded.settings()?;
            println!("config_ok=true config_hash={}", loaded.config_hash);
            for p in &settings.pools {
                let pool_id = p.resolved_pool_id();
                let book = settings.book.route(pool_id, &p.strategy_id);
                println!(
                    "pool_id={} strategy_id={} risk_profile={} book={} symbols={}",
                    pool_id,
                    p.strategy_id,
                    p.risk_profile,
                    book.as_str(),
                    p.symbols.join(",")
                );
            }
        }

        Commands::Profiles { paths } => {
            let loaded = aqc_config::load_layered_yaml(&paths)?;
            let profiles = loaded.settings()?.risk_profiles()?;
            for (name, p) in profiles.iter() {
                println!(
                    "profile={} max_daily_loss_pct={} max_daily_profit_pct={} target_daily_return_pct={} max_position_pct={} max_total_exposure_pct={} max_leverage={}",
                    name,
                    p.max_daily_loss_pct,
                    p.max_daily_profit_pct,
                    p.target_daily_return_pct,
                    p.max_position_pct,
                    p.max_total_exposure_pct,
                    p.max_leverage
                );
            }
        }

        Commands::Journal { cmd } => match cmd {
            JournalCmd::Verify { path } => match verify_hash_chain(&path)? {
                VerifyResult::Valid { lines } => {
                    println!("hash_chain_valid=true lines={lines}");
                }
                VerifyResult::Broken { line, reason } => {
                    bail!("hash chain broken at line {line}: {reason}");
                }
            },

            JournalCmd::Stats {
                path,
                pool_id,
                book,
            } => {
                let journal = load_journal(&path)?;
                let stats = journal.statistics(&StatsFilter {
                    pool_id,
                    book,
                    ..StatsFilter::default()
                });
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }

            JournalCmd::Trades {
                path,
                pool_id,
                book,
                symbol,
                limit,
            } => {
                let journal = load_journal(&path)?;
                let trades = journal.trade_history(&TradeFilter {
                    pool_id,
                    book,
                    symbol,
                    limit: Some(limit),
                });
                for t in trades {
                    println!("{}", serde_json::to_string(&t)?);
                }
            }

            JournalCmd::ExportDb { path } => {
                let content = read_journal(&path)?;
                let journal = Journal::replay_str(&content, MemorySink::default(), false)?;
                let records = parse_records(&content)?;
                let pool = aqc_db::connect_from_env().await?;

                let mut decisions = 0usize;
                let mut trades = 0usize;
                let mut touched: BTreeSet<DecisionId> = BTreeSet::new();
                for rec in &records {
                    match &rec.entry {
                        JournalEntry::Decision(d) => {
                            aqc_db::insert_decision(&pool, d).await?;
                            touched.insert(d.id);
                            decisions += 1;
                        }
                        JournalEntry::Trade(t) => {
                            aqc_db::insert_trade(&pool, t).await?;
                            trades += 1;
                        }
                        JournalEntry::Execution { decision_id, .. }
                        | JournalEntry::Outcome { decision_id, .. } => {
                            touched.insert(*decision_id);
                        }
                        JournalEntry::Realization(_) => {}
                    }
                }
                // Back-fills land on the rows in their final state.
                for id in touched {
                    if let Some(d) = journal.decision(id) {
                        aqc_db::update_decision_result(&pool, &d).await?;
                    }
                }
                info!(path = %path.display(), decisions, trades, "journal exported");
                println!("exported=true decisions={decisions} trades={trades}");
            }
        },

        Commands::Pool { cmd } => match cmd {
            PoolCmd::Show { pool_id } => {
                let db = aqc_db::connect_from_env().await?;
                let Some(state) = aqc_db::load_pool_state(&db, pool_id).await? else {
                    bail!("pool {pool_id} not found");
                };
                let out = serde_json::json!({
                    "pool": state.pool,
                    "orders": state.orders,
                    "shares": state.shares,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            }

            PoolCmd::History { pool_id, limit } => {
                let db = aqc_db::connect_from_env().await?;
                let out = serde_json::json!({
                    "decisions": aqc_db::load_decisions(&db, pool_id).await?,
                    "trades": aqc_db::load_trades(&db, pool_id, limit).await?,
                    "risk": aqc_db::load_risk_snapshots(&db, pool_id).await?,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
        },
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();
}

fn parse_book(s: &str) -> Result<BookType, String> {
    BookType::parse(s).map_err(|e| e.to_string())
}

fn read_journal(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read journal {}", path.display()))
}

/// In-memory replay; nothing is appended to `path`.
fn load_journal(path: &Path) -> Result<Journal> {
    let content = read_journal(path)?;
    Journal::replay_str(&content, MemorySink::default(), false)
        .with_context(|| format!("replay journal {}", path.display()))
}

fn parse_records(content: &str) -> Result<Vec<JournalRecord>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| {
            serde_json::from_str(l.trim()).with_context(|| format!("journal line {} is not a record", i + 1))
        })
        .collect()
}
