//! Strategy layer: candidate evaluators, the shared execution gate, burst
//! throttling and phase scaling.

pub mod arbitrage;
pub mod gate;
pub mod scaling;
pub mod swing;
pub mod throttle;

pub use arbitrage::{OpportunityConfig, OpportunityEvaluator};
pub use gate::{Candidate, ExecutionGate, GateRejection, Veto};
pub use scaling::{Phase, PhaseDecision, ScalingController};
pub use swing::{SignalConfig, SignalEvaluator};
pub use throttle::BurstThrottle;
