//! Meeting records and the contract every backend implements.
//!
//! Backends own a `MeetingStatusHandle`; everything else reads snapshots
//! through `MeetingBackend`.

pub mod backend;
pub mod model;
pub mod report;
pub mod status;
pub mod url;

pub use backend::{MeetingBackend, MeetingControl};
pub use model::{Meeting, MeetingStatus, Participant, TranscriptEntry};
pub use report::MeetingReport;
pub use status::{MeetingStatusHandle, SessionState};
pub use url::{MeetUrl, MeetUrlParser};
