use failover_watcher::config::WatcherConfig;
use failover_watcher::monitoring::{AccessLogWatcher, AlertDispatcher, WebhookSink};
use failover_watcher::shutdown::shutdown_signal;
use failover_watcher::utils::{init_logging, AppError};
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // 1. 환경변수 로드
    dotenvy::dotenv().ok();

    // 2. 로깅 초기화 (guard는 종료 시까지 유지)
    let _guard = init_logging();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, error_code = e.error_code(), fatal = e.is_fatal(), "Watcher terminated");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), AppError> {
    // 3. 설정 로드
    let config = WatcherConfig::from_env()?;

    info!(
        log_path = %config.log_path.display(),
        window_size = config.window_size,
        error_rate_threshold = config.error_rate_threshold,
        alert_cooldown_secs = config.alert_cooldown.as_secs(),
        webhook_configured = config.webhook_url.is_some(),
        "Configuration loaded"
    );

    // 4. 알림 전송 태스크 구성
    let (dispatcher, sender_task) = match &config.webhook_url {
        Some(url) => {
            let sink = WebhookSink::new(url.clone(), config.alert_timeout);
            let (dispatcher, sender) = AlertDispatcher::with_sink(
                sink,
                config.alert_cooldown,
                config.alert_queue_capacity,
            );
            (dispatcher, Some(tokio::spawn(sender.run())))
        }
        None => (AlertDispatcher::local_only(config.alert_cooldown), None),
    };

    // 5. 감시 루프 실행
    let mut watcher = AccessLogWatcher::from_config(&config, dispatcher);
    let result = watcher
        .run(
            config.log_path.clone(),
            config.line_source_settings(),
            shutdown_signal(),
        )
        .await;

    // 6. 대기 중인 알림 전송 마무리
    if let Some(task) = sender_task {
        if let Err(e) = task.await {
            error!(error = %e, "Alert sender task failed");
        }
    }

    result
}
