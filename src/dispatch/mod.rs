//! Review dispatch: claim-and-publish of pending items.

mod outbound;
mod scheduler;

pub use outbound::{OutboundReview, ReviewCallback};
pub use scheduler::{DispatchReport, DispatchScheduler};
