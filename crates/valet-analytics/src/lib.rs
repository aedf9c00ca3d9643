pub mod profile;
pub mod sink;
pub mod types;

pub use sink::{AnalyticsMetrics, AnalyticsSink};
pub use types::{AnalyticsEvent, BehaviorPattern, EngagementLevel, EventKind, UserProfile};
