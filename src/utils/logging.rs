//! 로깅 초기화 모듈
//!
//! 사람이 읽기 쉬운 텍스트(기본값) 또는 JSON 형식으로 stdout에 출력합니다.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "info,failover_watcher=debug";

/// stdout 로그 포맷
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// `LOG_FORMAT` 값 해석. 알 수 없는 값은 `Text`로 처리합니다.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// 로깅 시스템을 초기화합니다.
///
/// 환경 변수 `RUST_LOG`로 로그 레벨을, `LOG_FORMAT`(`text` | `json`)으로 출력 형식을 설정합니다.
/// 기본 필터는 `info,failover_watcher=debug`입니다.
///
/// 반환되는 `WorkerGuard`를 main에서 유지해야 프로세스 종료 시 버퍼링된 로그가 손실되지 않습니다.
pub fn init_logging() -> WorkerGuard {
    let format = std::env::var("LOG_FORMAT")
        .map(|v| LogFormat::parse(&v))
        .unwrap_or(LogFormat::Text);

    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());

    let stdout_layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_current_span(true)
            .flatten_event(false)
            .with_writer(non_blocking)
            .boxed(),
        LogFormat::Text => fmt::layer()
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_target(false)
            .with_writer(non_blocking)
            .boxed(),
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .try_init()
        .or_else(|err| {
            // Detect "already initialized" via source downcasting
            use std::error::Error;
            if err
                .source()
                .and_then(|s| s.downcast_ref::<tracing::dispatcher::SetGlobalDefaultError>())
                .is_some()
            {
                return Ok(());
            }
            eprintln!("Failed to initialize tracing: {}", err);
            Err(err)
        })
        .ok();

    guard
}
