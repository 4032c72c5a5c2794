use chrono::{DateTime, Utc};

use crate::meeting::Meeting;

/// Status block an agent can fold into its prompt context.
pub fn meeting_context(current: Option<&Meeting>, now: DateTime<Utc>) -> String {
    let Some(meeting) = current else {
        return "No active Google Meet meeting".to_string();
    };

    format!(
        "Current Google Meet:\n- Meeting Link: {}\n- Meeting Code: {}\n- Status: {}\n- Duration: {} minutes\n- Active Participants: {}\n- Total Participants: {}",
        meeting.meeting_uri,
        meeting.meeting_code,
        meeting.status.as_str(),
        meeting.duration_minutes(now),
        meeting.active_participants().count(),
        meeting.participants.len()
    )
}
