use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{interval_at, Duration, Instant};
use trendbot::api::{BinanceFuturesClient, MarketDataSource};
use trendbot::app::{next_run_at, Analyzer, LogSink, PositionMonitor, SchedulerState, SignalSink};
use trendbot::config::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "trendbot", about = "Multi-timeframe trade signal bot for Binance futures")]
struct Cli {
    /// Directory holding default.toml / local.toml
    #[arg(long, default_value = "config")]
    config: PathBuf,

    /// Run a single analysis cycle and exit
    #[arg(long)]
    once: bool,

    /// Do not start the position monitor loop
    #[arg(long)]
    no_monitor: bool,
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Instant of the next HH:`minute`:00 wall-clock boundary
fn next_cycle_instant(minute: u32) -> Instant {
    let now = Utc::now();
    let wait = (next_run_at(now, minute) - now).to_std().unwrap_or_default();
    Instant::now() + wait
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    tracing::info!("🚀 Trendbot starting");

    let cfg = AppConfig::load(&cli.config).context("Failed to load configuration")?;

    let client = BinanceFuturesClient::new(&cfg.exchange, cfg.runtime.request_timeout_secs)
        .context("Failed to build exchange client")?;
    if !client.has_credentials() {
        tracing::warn!("BINANCE_API_KEY / BINANCE_API_SECRET not set, account calls will fail");
    }
    let source: Arc<dyn MarketDataSource> = Arc::new(client);
    let sink: Arc<dyn SignalSink> = Arc::new(LogSink);

    let analyzer = Analyzer::from_config(&cfg, source.clone(), sink.clone())?;

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Preset: {}", cfg.strategy.preset);
    for status in analyzer.decisions().status() {
        tracing::info!(
            "  Strategy {} ({}): weight {:.2}",
            status.name,
            if status.enabled { "enabled" } else { "disabled" },
            status.weight
        );
    }
    for symbol in analyzer.symbols() {
        tracing::info!(
            "    - {}: ATR {} x{} on {}, risk {}%",
            symbol.symbol,
            symbol.atr_length,
            symbol.atr_multiplier,
            symbol.atr_timeframe,
            symbol.risk_percent
        );
    }

    let mut state = SchedulerState::new(Utc::now(), cfg.runtime.alert_cooldown_minutes);

    if cli.once {
        let report = analyzer.run_cycle(&mut state, Utc::now()).await;
        tracing::info!("👋 Single cycle finished: {} plan(s)", report.plans.len());
        return Ok(());
    }

    tracing::info!("\n🔄 Spawning independent loops...");

    let run_at_minute = cfg.runtime.run_at_minute;
    let analysis_task = tokio::spawn(async move {
        analysis_loop(analyzer, state, run_at_minute).await;
    });

    let monitor_task = if cli.no_monitor {
        tracing::info!("  Position monitor disabled (--no-monitor)");
        None
    } else {
        let monitor = PositionMonitor::from_config(&cfg, source, sink)?;
        let interval = Duration::from_secs(cfg.runtime.monitor_interval_secs);
        Some(tokio::spawn(async move {
            position_monitor_loop(monitor, interval).await;
        }))
    };

    tracing::info!("✅ Loops spawned");
    tracing::info!("  🔎 Analysis: hourly at HH:{:02}", run_at_minute);
    tracing::info!("  👀 Position monitor: every {}s", cfg.runtime.monitor_interval_secs);
    tracing::info!("\nPress Ctrl+C to stop...\n");

    let monitor_done = async {
        match monitor_task {
            Some(task) => task.await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
        }
        result = analysis_task => {
            tracing::error!("Analysis loop exited: {:?}", result);
        }
        result = monitor_done => {
            tracing::error!("Position monitor loop exited: {:?}", result);
        }
    }

    tracing::info!("👋 Trendbot stopped");
    Ok(())
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trendbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// ============================================================================
// Loop 1: Analysis (hourly, clock-aligned)
// ============================================================================

async fn analysis_loop(analyzer: Analyzer, mut state: SchedulerState, run_at_minute: u32) {
    tracing::info!("🔎 Analysis Loop starting...");

    let start = next_cycle_instant(run_at_minute);
    tracing::info!("First analysis in {:?}", start - Instant::now());

    let mut ticker = interval_at(start, Duration::from_secs(3600));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let report = analyzer.run_cycle(&mut state, Utc::now()).await;
        if report.all_failed() {
            tracing::error!(
                "Cycle produced nothing ({} failed cycle(s) in a row)",
                state.consecutive_failed_cycles
            );
        }
    }
}

// ============================================================================
// Loop 2: Position Monitor
// ============================================================================

async fn position_monitor_loop(mut monitor: PositionMonitor, every: Duration) {
    tracing::info!("👀 Position Monitor Loop starting...");

    let mut ticker = interval_at(Instant::now(), every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match monitor.run_once(Utc::now()).await {
            Ok(report) if report.positions > 0 => tracing::debug!(
                "Monitor tick: {} position(s), {} stop / {} exit advisories, {} risk alerts, {} held too long",
                report.positions,
                report.stop_advisories,
                report.exit_advisories,
                report.risk_alerts,
                report.long_held
            ),
            Ok(_) => {}
            Err(e) => tracing::error!("Monitor could not read positions: {}", e),
        }
    }
}
