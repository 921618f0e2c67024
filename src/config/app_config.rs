use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::monitoring::line_source::LineSourceSettings;
use crate::monitoring::pool::PoolTable;

pub const DEFAULT_LOG_PATH: &str = "/var/log/nginx/access.log";
pub const DEFAULT_WINDOW_SIZE: usize = 200;
pub const DEFAULT_ERROR_RATE_THRESHOLD: f64 = 2.0;
pub const DEFAULT_ALERT_COOLDOWN_SECS: u64 = 300;
pub const DEFAULT_ALERT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_ALERT_QUEUE_CAPACITY: usize = 32;
pub const DEFAULT_BLUE_MATCHERS: &str = "app_blue,172.18.0.3:";
pub const DEFAULT_GREEN_MATCHERS: &str = "app_green,172.18.0.2:";

/// 감시 프로세스 설정
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// 감시할 access log 경로
    pub log_path: PathBuf,
    /// Slack 호환 webhook URL. 없으면 로컬 로그로만 알림을 남깁니다.
    pub webhook_url: Option<String>,
    /// 에러율 계산에 사용하는 최근 요청 수
    pub window_size: usize,
    /// 에러율 임계값 (퍼센트)
    pub error_rate_threshold: f64,
    /// 알림 종류별 재전송 대기 시간
    pub alert_cooldown: Duration,
    /// webhook 요청 타임아웃
    pub alert_timeout: Duration,
    /// 전송 대기열 크기
    pub alert_queue_capacity: usize,
    pub blue_matchers: Vec<String>,
    pub green_matchers: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            webhook_url: None,
            window_size: DEFAULT_WINDOW_SIZE,
            error_rate_threshold: DEFAULT_ERROR_RATE_THRESHOLD,
            alert_cooldown: Duration::from_secs(DEFAULT_ALERT_COOLDOWN_SECS),
            alert_timeout: Duration::from_secs(DEFAULT_ALERT_TIMEOUT_SECS),
            alert_queue_capacity: DEFAULT_ALERT_QUEUE_CAPACITY,
            blue_matchers: split_matchers(DEFAULT_BLUE_MATCHERS),
            green_matchers: split_matchers(DEFAULT_GREEN_MATCHERS),
        }
    }
}

impl WatcherConfig {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 임의의 key 조회 함수로 설정 로드
    ///
    /// 값이 없거나 비어 있으면 기본값을 사용하고, 해석할 수 없는 값은 에러로 처리합니다.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let defaults = Self::default();

        let log_path = get("LOG_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.log_path);

        let webhook_url = get("SLACK_WEBHOOK_URL");

        let window_size = match get("WINDOW_SIZE") {
            Some(v) => v.parse().map_err(|_| ConfigError::InvalidWindowSize)?,
            None => defaults.window_size,
        };
        if window_size == 0 {
            return Err(ConfigError::InvalidWindowSize);
        }

        let error_rate_threshold: f64 = match get("ERROR_RATE_THRESHOLD") {
            Some(v) => v.parse().map_err(|_| ConfigError::InvalidThreshold)?,
            None => defaults.error_rate_threshold,
        };
        if !error_rate_threshold.is_finite() || error_rate_threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold);
        }

        let alert_cooldown = match get("ALERT_COOLDOWN_SEC") {
            Some(v) => Duration::from_secs(v.parse().map_err(|_| ConfigError::InvalidCooldown)?),
            None => defaults.alert_cooldown,
        };

        let alert_timeout = match get("ALERT_TIMEOUT_SEC") {
            Some(v) => Duration::from_secs(v.parse().map_err(|_| ConfigError::InvalidTimeout)?),
            None => defaults.alert_timeout,
        };

        let alert_queue_capacity = match get("ALERT_QUEUE_CAPACITY") {
            Some(v) => v.parse().map_err(|_| ConfigError::InvalidQueueCapacity)?,
            None => defaults.alert_queue_capacity,
        };
        if alert_queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity);
        }

        let blue_matchers = match get("BLUE_POOL_MATCHERS") {
            Some(v) => split_matchers(&v),
            None => defaults.blue_matchers,
        };
        if blue_matchers.is_empty() {
            return Err(ConfigError::EmptyPoolMatchers("BLUE_POOL_MATCHERS"));
        }

        let green_matchers = match get("GREEN_POOL_MATCHERS") {
            Some(v) => split_matchers(&v),
            None => defaults.green_matchers,
        };
        if green_matchers.is_empty() {
            return Err(ConfigError::EmptyPoolMatchers("GREEN_POOL_MATCHERS"));
        }

        if webhook_url.is_none() {
            tracing::warn!("SLACK_WEBHOOK_URL 환경변수가 설정되지 않았습니다. 알림은 로컬 로그로만 기록됩니다.");
        }

        Ok(Self {
            log_path,
            webhook_url,
            window_size,
            error_rate_threshold,
            alert_cooldown,
            alert_timeout,
            alert_queue_capacity,
            blue_matchers,
            green_matchers,
        })
    }

    /// 설정된 패턴으로 pool 조회 테이블 생성
    pub fn pool_table(&self) -> PoolTable {
        PoolTable::from_matchers(&self.blue_matchers, &self.green_matchers)
    }

    pub fn line_source_settings(&self) -> LineSourceSettings {
        LineSourceSettings::default()
    }
}

fn split_matchers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("WINDOW_SIZE must be a positive integer")]
    InvalidWindowSize,
    #[error("ERROR_RATE_THRESHOLD must be a non-negative number")]
    InvalidThreshold,
    #[error("ALERT_COOLDOWN_SEC must be a non-negative integer")]
    InvalidCooldown,
    #[error("ALERT_TIMEOUT_SEC must be a non-negative integer")]
    InvalidTimeout,
    #[error("ALERT_QUEUE_CAPACITY must be a positive integer")]
    InvalidQueueCapacity,
    #[error("{0} must contain at least one pattern")]
    EmptyPoolMatchers(&'static str),
}
