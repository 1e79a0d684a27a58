// Strategy arbitration
pub mod engine;

pub use engine::{
    Decision, DecisionConfig, DecisionEngine, ReversalInfo, StrategyStatus, StrategyWeights,
};
