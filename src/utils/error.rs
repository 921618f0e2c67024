use crate::config::ConfigError;

/// 애플리케이션 전역 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// `{`로 시작하지만 JSON 객체로 해석할 수 없는 로그 라인
    #[error("malformed log record: {0}")]
    MalformedRecord(String),

    /// 알림 전송 실패 (전송 오류 또는 2xx 이외의 응답)
    #[error("alert delivery failed: {0}")]
    DeliveryFailed(String),

    /// 파일이 존재하지만 열 수 없는 경우
    #[error("log source unavailable: {0}")]
    SourceUnavailable(String),

    /// 감시 중이던 파일을 더 이상 읽을 수 없는 경우 (watch loop 종료)
    #[error("log source lost: {0}")]
    SourceLost(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AppError {
    /// 로그 마커로 사용하는 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::MalformedRecord(_) => "MALFORMED_RECORD",
            AppError::DeliveryFailed(_) => "DELIVERY_FAILED",
            AppError::SourceUnavailable(_) => "SOURCE_UNAVAILABLE",
            AppError::SourceLost(_) => "SOURCE_LOST",
            AppError::Config(_) => "CONFIG",
        }
    }

    /// watch loop를 종료해야 하는 에러인지 여부
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::SourceLost(_) | AppError::SourceUnavailable(_) | AppError::Config(_)
        )
    }
}

/// 편의 함수들
impl AppError {
    pub fn malformed_record(msg: impl Into<String>) -> Self {
        AppError::MalformedRecord(msg.into())
    }

    pub fn delivery_failed(msg: impl Into<String>) -> Self {
        AppError::DeliveryFailed(msg.into())
    }

    pub fn source_lost(msg: impl Into<String>) -> Self {
        AppError::SourceLost(msg.into())
    }

    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        AppError::SourceUnavailable(msg.into())
    }
}
