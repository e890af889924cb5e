//! 텔레그램 알림 서비스.
//!
//! Telegram Bot API `sendMessage`로 일일 데이터 알림을 전송합니다.

use std::time::Duration;

use async_trait::async_trait;
use eod_core::TelegramSettings;
use tracing::{debug, error, info, warn};

use crate::types::{
    Notification, NotificationError, NotificationEvent, NotificationPriority, NotificationResult,
    NotificationSender,
};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// 텔레그램 알림 전송 설정.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// @BotFather에서 받은 봇 토큰
    pub bot_token: String,
    /// 메시지를 보낼 채팅 ID
    pub chat_id: String,
    /// 전송 활성화 여부
    pub enabled: bool,
    /// 파싱 모드 (HTML 또는 MarkdownV2)
    pub parse_mode: String,
    /// Bot API 기본 URL
    pub api_base: String,
}

impl TelegramConfig {
    /// 새 텔레그램 설정을 생성합니다.
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            bot_token,
            chat_id,
            enabled: true,
            parse_mode: "HTML".to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// 애플리케이션 설정에서 생성합니다.
    pub fn from_settings(settings: &TelegramSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ..Self::new(settings.bot_token.clone(), settings.chat_id.clone())
        }
    }

    /// 환경 변수에서 설정을 생성합니다.
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").ok()?;
        let enabled = std::env::var("TELEGRAM_ENABLED")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(true);

        Some(Self {
            enabled,
            ..Self::new(bot_token, chat_id)
        })
    }

    /// Bot API 기본 URL을 바꿉니다.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

/// 텔레그램 알림 전송기.
pub struct TelegramSender {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramSender {
    /// 새 텔레그램 전송기를 생성합니다.
    pub fn new(config: TelegramConfig) -> NotificationResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { config, client })
    }

    /// 환경 변수에서 전송기를 생성합니다.
    pub fn from_env() -> Option<Self> {
        TelegramConfig::from_env().and_then(|config| Self::new(config).ok())
    }

    /// 알림을 텔레그램 메시지로 포맷합니다.
    fn format_message(&self, notification: &Notification) -> String {
        let priority_emoji = match notification.priority {
            NotificationPriority::Low => "ℹ️",
            NotificationPriority::Normal => "📊",
            NotificationPriority::High => "⚠️",
        };

        let content = match &notification.event {
            NotificationEvent::DailyDataReady {
                date,
                contributed,
                sections,
                failed,
            } => {
                let mut message = format!(
                    "<b>장 마감 데이터 준비</b> ({})\n\n\
                     수집 소스: {}\n\
                     섹션: {}",
                    escape_html(date),
                    join_or_dash(contributed),
                    join_or_dash(sections),
                );
                if !failed.is_empty() {
                    message.push_str(&format!("\n실패: {}", join_or_dash(failed)));
                }
                message
            }
            NotificationEvent::SyncFailed { date, reasons } => {
                let reasons: Vec<String> = reasons.iter().map(|r| escape_html(r)).collect();
                format!(
                    "<b>장 마감 데이터 수집 실패</b> ({})\n\n{}",
                    escape_html(date),
                    reasons.join("\n")
                )
            }
            NotificationEvent::Custom { title, message } => {
                format!("<b>{}</b>\n\n{}", escape_html(title), escape_html(message))
            }
        };

        format!("{priority_emoji} {content}")
    }

    /// 텔레그램에 메시지를 전송합니다.
    async fn send_message(&self, text: &str) -> NotificationResult<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        );

        let params = serde_json::json!({
            "chat_id": self.config.chat_id,
            "text": text,
            "parse_mode": self.config.parse_mode,
            "disable_web_page_preview": true,
        });

        debug!(chat_id = %self.config.chat_id, "텔레그램 메시지 전송");

        let response = self.client.post(&url).json(&params).send().await?;

        if response.status().is_success() {
            info!("텔레그램 알림 전송 완료");
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 429 {
            warn!("텔레그램 요청 한도 초과");
            return Err(NotificationError::RateLimited(60));
        }

        error!(status = %status, body = %body, "텔레그램 메시지 전송 실패");
        Err(NotificationError::SendFailed(format!("HTTP {}: {}", status, body)))
    }
}

fn join_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items
            .iter()
            .map(|item| escape_html(item))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// HTML parse mode 예약 문자 이스케이프.
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn send(&self, notification: &Notification) -> NotificationResult<()> {
        if !self.is_enabled() {
            debug!("텔레그램 알림 비활성화, 건너뜀");
            return Ok(());
        }

        let message = self.format_message(notification);
        self.send_message(&message).await
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.bot_token.is_empty() && !self.config.chat_id.is_empty()
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

/// 여러 전송기를 관리하는 알림 관리자.
#[derive(Default)]
pub struct NotificationManager {
    senders: Vec<Box<dyn NotificationSender>>,
}

impl NotificationManager {
    /// 새 알림 관리자를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 알림 전송기를 추가합니다.
    pub fn add_sender<S: NotificationSender + 'static>(&mut self, sender: S) {
        self.senders.push(Box::new(sender));
    }

    /// 활성화된 전송기 수.
    pub fn enabled_count(&self) -> usize {
        self.senders.iter().filter(|s| s.is_enabled()).count()
    }

    /// 활성화된 모든 전송기로 알림을 보냅니다.
    ///
    /// 하나 이상 전달되면 `true`. 실패는 로그만 남기고 재시도하지 않습니다.
    pub async fn notify(&self, notification: &Notification) -> bool {
        let mut delivered = false;

        for sender in self.senders.iter().filter(|s| s.is_enabled()) {
            match sender.send(notification).await {
                Ok(()) => delivered = true,
                Err(e) => {
                    error!(sender = sender.name(), error = %e, "알림 전송 실패");
                }
            }
        }

        if !delivered {
            debug!(
                id = %notification.id,
                enabled = self.enabled_count(),
                "전달된 알림 없음"
            );
        }
        delivered
    }
}
