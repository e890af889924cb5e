//! 도메인 모델.

pub mod holiday;
pub mod raw;
pub mod record;
pub mod sections;
pub mod source;

pub use holiday::{is_weekend, HolidayEntry};
pub use raw::RawRecord;
pub use record::{AggregateRecord, RecordPatch, SourceStatus};
pub use sections::{
    InstitutionalEntry, InstitutionalPositions, LargeTraderPositions, MarketSummary,
    PutCallRatio, SectionKind, SectionPatch, Sections,
};
pub use source::SourceKind;
