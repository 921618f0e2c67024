//! Access log monitoring
//!
//! - Tailing the proxy access log (`line_source`)
//! - Record parsing and status classification (`record`)
//! - Upstream to pool resolution (`pool`)
//! - Failover and error-rate detection (`analyzer`, `window`)
//! - Cooldown-gated webhook alerts (`alert`)
//! - The watch loop tying them together (`watcher`)

pub mod alert;
pub mod analyzer;
pub mod line_source;
pub mod pool;
pub mod record;
pub mod watcher;
pub mod window;

pub use alert::{AlertDispatcher, AlertSender, AlertSink, DispatchOutcome, WebhookSink};
pub use analyzer::{Alert, AlertCategory, Analysis, StreamAnalyzer};
pub use line_source::{LinePoll, LineSource, LineSourceSettings};
pub use pool::{Pool, PoolTable};
pub use record::{parse_line, LogRecord, ParsedLine};
pub use watcher::{AccessLogWatcher, WatchStats, WatcherResult};
pub use window::OutcomeWindow;
