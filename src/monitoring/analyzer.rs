//! Stream analyzer for failover and error-rate detection
//!
//! Records are fed in arrival order. For each one the analyzer:
//! - classifies the upstream status (any 5xx attempt counts as an error)
//! - resolves the pool that served the request
//! - raises a failover alert when the serving pool changes between two known pools
//! - pushes the outcome into the window and raises an error-rate alert while the
//!   full window is above the threshold

use crate::monitoring::pool::{Pool, PoolTable};
use crate::monitoring::record::LogRecord;
use crate::monitoring::window::OutcomeWindow;
use std::fmt;

/// Alert kind, used as the cooldown key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertCategory {
    Failover,
    ErrorRate,
}

impl AlertCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCategory::Failover => "failover",
            AlertCategory::ErrorRate => "error_rate",
        }
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition detected on a record
#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    Failover {
        from: Pool,
        to: Pool,
        time: String,
        upstream: String,
        status: String,
    },
    ErrorRate {
        /// Percentage of errors in the window
        rate: f64,
        errors: usize,
        window_size: usize,
        threshold: f64,
        pool: Pool,
        time: String,
    },
}

impl Alert {
    pub fn category(&self) -> AlertCategory {
        match self {
            Alert::Failover { .. } => AlertCategory::Failover,
            Alert::ErrorRate { .. } => AlertCategory::ErrorRate,
        }
    }

    /// Slack-formatted alert text
    pub fn message(&self) -> String {
        match self {
            Alert::Failover {
                from,
                to,
                time,
                upstream,
                status,
            } => format!(
                "🔄 *Failover Detected!*\n\
                 Pool switched: `{from}` → `{to}`\n\
                 Time: {time}\n\
                 Upstream addresses: {upstream}\n\
                 Status: {status}"
            ),
            Alert::ErrorRate {
                rate,
                errors,
                window_size,
                threshold,
                pool,
                time,
            } => format!(
                "🚨 *High Error Rate Alert!*\n\
                 Error Rate: `{rate:.2}%` ({errors}/{window_size} requests)\n\
                 Threshold: `{threshold:?}%`\n\
                 Current Pool: `{pool}`\n\
                 Time: {time}"
            ),
        }
    }
}

/// Per-record analysis result
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub pool: Pool,
    /// More than one upstream was tried for this request
    pub failover_attempted: bool,
    pub is_error: bool,
    /// Failover alert first, then error-rate alert
    pub alerts: Vec<Alert>,
}

/// Stateful analyzer owning the last known pool and the outcome window
#[derive(Debug, Clone)]
pub struct StreamAnalyzer {
    pools: PoolTable,
    window: OutcomeWindow,
    threshold: f64,
    /// Never `Some(Pool::Unknown)`
    last_pool: Option<Pool>,
}

impl StreamAnalyzer {
    pub fn new(pools: PoolTable, window_size: usize, threshold: f64) -> Self {
        Self {
            pools,
            window: OutcomeWindow::new(window_size),
            threshold,
            last_pool: None,
        }
    }

    /// Analyze one record and update state
    pub fn analyze(&mut self, record: &LogRecord) -> Analysis {
        let is_error = record.is_error();
        let pool = self.pools.resolve(&record.upstream);

        let mut alerts = Vec::new();

        if let Some(alert) = self.check_failover(pool, record) {
            alerts.push(alert);
        }

        self.window.push(is_error);
        if let Some(alert) = self.check_error_rate(pool, record) {
            alerts.push(alert);
        }

        Analysis {
            pool,
            failover_attempted: record.is_failover_attempt(),
            is_error,
            alerts,
        }
    }

    fn check_failover(&mut self, pool: Pool, record: &LogRecord) -> Option<Alert> {
        if !pool.is_known() {
            return None;
        }

        let previous = self.last_pool.replace(pool);
        match previous {
            Some(from) if from != pool => Some(Alert::Failover {
                from,
                to: pool,
                time: record.time.clone(),
                upstream: record.upstream.clone(),
                status: record.status.clone(),
            }),
            _ => None,
        }
    }

    fn check_error_rate(&self, pool: Pool, record: &LogRecord) -> Option<Alert> {
        let rate = self.window.error_rate()?;
        if rate <= self.threshold {
            return None;
        }

        Some(Alert::ErrorRate {
            rate,
            errors: self.window.error_count(),
            window_size: self.window.capacity(),
            threshold: self.threshold,
            pool,
            time: record.time.clone(),
        })
    }

    pub fn last_pool(&self) -> Option<Pool> {
        self.last_pool
    }

    pub fn window(&self) -> &OutcomeWindow {
        &self.window
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}
