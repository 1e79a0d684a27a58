// Scheduled analysis and position monitoring
pub mod cycle;
pub mod monitor;
pub mod notify;
pub mod scheduler;

pub use cycle::{build_decision_engine, Analyzer, CycleReport, SymbolError, SymbolOutcome};
pub use monitor::{MonitorReport, PositionMonitor};
pub use notify::{LogSink, SignalSink};
pub use scheduler::{next_run_at, SchedulerState};
