//! 영업일 단위 알림 중복 제거.

use std::sync::Mutex;

use tracing::debug;

/// 마지막으로 알림을 보낸 영업일을 기억합니다.
///
/// 같은 영업일에 대해 스케줄러 재실행이나 수동 트리거가 반복되어도
/// 외부 알림은 한 번만 나갑니다.
#[derive(Debug, Default)]
pub struct NotificationDeduplicator {
    last_notified: Mutex<Option<String>>,
}

impl NotificationDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 날짜와 다르면 갱신 후 `true`, 같으면 `false`.
    ///
    /// 비교와 갱신은 하나의 임계 구역에서 수행됩니다.
    pub fn should_notify(&self, date: &str) -> bool {
        let mut last = self.last_notified.lock().unwrap_or_else(|e| e.into_inner());
        if last.as_deref() == Some(date) {
            debug!(date = date, "이미 알림을 보낸 영업일");
            return false;
        }
        *last = Some(date.to_string());
        true
    }

    /// 마지막으로 알림을 보낸 영업일.
    pub fn last_notified(&self) -> Option<String> {
        self.last_notified
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_once_per_distinct_date() {
        let dedup = NotificationDeduplicator::new();
        assert!(dedup.should_notify("2025-04-15"));
        assert!(!dedup.should_notify("2025-04-15"));
        assert!(!dedup.should_notify("2025-04-15"));

        assert!(dedup.should_notify("2025-04-16"));
        assert!(!dedup.should_notify("2025-04-16"));
        assert_eq!(dedup.last_notified().as_deref(), Some("2025-04-16"));
    }

    #[test]
    fn test_switching_back_notifies_again() {
        let dedup = NotificationDeduplicator::new();
        assert!(dedup.should_notify("2025-04-15"));
        assert!(dedup.should_notify("2025-04-14"));
        assert!(dedup.should_notify("2025-04-15"));
    }

    #[test]
    fn test_concurrent_callers_notify_once() {
        let dedup = Arc::new(NotificationDeduplicator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dedup = dedup.clone();
                std::thread::spawn(move || dedup.should_notify("2025-04-15"))
            })
            .collect();

        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|granted| *granted)
            .count();
        assert_eq!(granted, 1);
    }
}
