pub mod aggregator;
pub mod domain;
pub mod ports;
pub mod timeline;

pub use aggregator::StudyTimeAggregator;
pub use domain::{
    ActiveSessionView, CalendarEntry, DayProgressView, DayTotals, StopOutcome, StudySession,
    TodaySummary,
};
pub use ports::{Clock, PortError, PortResult, StudyStore, SystemClock};
