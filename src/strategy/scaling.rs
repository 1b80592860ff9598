//! Timed risk escalation.
//!
//! The run starts in the first phase. Once the run has lasted a phase's
//! duration and the portfolio is both winning often enough and up overall,
//! the next phase's sizing limits take over. Phases never regress and the
//! last phase is final.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::config::{PhaseConfig, ScalingConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct Phase {
    pub duration: Duration,
    pub min_trade_notional: Decimal,
    pub max_position_fraction: Decimal,
}

impl From<&PhaseConfig> for Phase {
    fn from(p: &PhaseConfig) -> Self {
        Self {
            duration: Duration::hours(p.duration_hours as i64),
            min_trade_notional: p.min_trade_size,
            max_position_fraction: p.max_position_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PhaseDecision {
    /// Moved up; the new phase's limits apply.
    Advanced { from: usize, to: usize },
    /// Duration served but performance criteria unmet.
    Held { unmet: Vec<String> },
    /// Current phase duration not yet reached.
    Waiting,
    /// Already in the last phase.
    Terminal,
}

pub struct ScalingController {
    phases: Vec<Phase>,
    current: usize,
    started_at: DateTime<Utc>,
    win_rate_threshold: Decimal,
    min_total_return: Decimal,
}

impl ScalingController {
    pub fn new(
        phases: Vec<Phase>,
        started_at: DateTime<Utc>,
        win_rate_threshold: Decimal,
        min_total_return: Decimal,
    ) -> Self {
        Self {
            phases,
            current: 0,
            started_at,
            win_rate_threshold,
            min_total_return,
        }
    }

    pub fn from_config(cfg: &ScalingConfig, started_at: DateTime<Utc>) -> Self {
        Self::new(
            cfg.phases.iter().map(Phase::from).collect(),
            started_at,
            cfg.win_rate_threshold,
            cfg.min_total_return,
        )
    }

    /// Zero-based index of the active phase.
    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_phase(&self) -> Option<&Phase> {
        self.phases.get(self.current)
    }

    /// Check whether to advance. `win_rate` and `total_return` are fractions.
    pub fn evaluate(&mut self, now: DateTime<Utc>, win_rate: Decimal, total_return: Decimal) -> PhaseDecision {
        if self.current + 1 >= self.phases.len() {
            return PhaseDecision::Terminal;
        }

        let elapsed = now - self.started_at;
        let phase = &self.phases[self.current];
        if elapsed < phase.duration {
            return PhaseDecision::Waiting;
        }

        let mut unmet = Vec::new();
        if win_rate <= self.win_rate_threshold {
            unmet.push(format!("win rate {:.1}% <= {:.1}%", win_rate * Decimal::ONE_HUNDRED, self.win_rate_threshold * Decimal::ONE_HUNDRED));
        }
        if total_return <= self.min_total_return {
            unmet.push(format!(
                "total return {:.2}% <= {:.2}%",
                total_return * Decimal::ONE_HUNDRED,
                self.min_total_return * Decimal::ONE_HUNDRED
            ));
        }
        if !unmet.is_empty() {
            warn!(phase = self.current + 1, unmet = ?unmet, "Phase advance criteria not met");
            return PhaseDecision::Held { unmet };
        }

        let from = self.current;
        self.current += 1;
        let next = &self.phases[self.current];
        info!(
            from = from + 1,
            to = self.current + 1,
            min_trade = %next.min_trade_notional,
            max_position = %next.max_position_fraction,
            "Advanced to next phase"
        );
        PhaseDecision::Advanced { from, to: self.current }
    }
}
