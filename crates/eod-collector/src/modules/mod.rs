//! 수집 작업 모듈.

pub mod daily_sync;
pub mod holiday_refresh;
pub mod retention;
pub mod scheduler;

pub use daily_sync::{resolve_target_date, DailySync, SyncOptions};
pub use holiday_refresh::refresh_holidays;
pub use retention::{cleanup_old_records, retention_cutoff, RetentionReport};
pub use scheduler::{
    plan_arm, ArmDecision, Clock, ScheduleParams, ScheduleState, Scheduler, SchedulerHandle,
};
