//! # EOD Notification
//!
//! 장 마감 데이터 알림 서비스.
//!
//! - Telegram Bot API 전송기
//! - 영업일 단위 알림 중복 제거

pub mod dedup;
pub mod telegram;
pub mod types;

pub use dedup::*;
pub use telegram::*;
pub use types::*;
