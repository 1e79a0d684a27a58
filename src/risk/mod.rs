// Risk management module
pub mod position_risk;
pub mod position_sizer;
pub mod trailing_stop;

pub use position_risk::{PositionRisk, PositionRiskLimits, RiskLevel};
pub use position_sizer::{AtrReading, PositionSizer, ProfitTarget, RiskProfile, TradePlan};
pub use trailing_stop::{trailing_stop, StopAdvisory, TrailingStopTracker};
