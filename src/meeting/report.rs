//! Read-only views derived from a meeting: plain-text summaries and reports.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::model::{Meeting, TranscriptEntry};

const SUMMARY_RECENT_LINES: usize = 10;

/// Number of segments each speaker contributed, in first-seen order.
pub fn speaker_contributions(entries: &[TranscriptEntry]) -> Vec<SpeakerContribution> {
    let mut stats: Vec<SpeakerContribution> = Vec::new();
    for entry in entries {
        match stats.iter_mut().find(|s| s.speaker == entry.speaker_name) {
            Some(stat) => stat.segments += 1,
            None => stats.push(SpeakerContribution {
                speaker: entry.speaker_name.clone(),
                segments: 1,
            }),
        }
    }
    stats
}

/// `speaker: text` lines, one per entry.
pub fn transcript_text(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .map(|entry| format!("{}\n", entry.line()))
        .collect()
}

/// Last `count` entries rendered as `speaker: text` lines.
pub fn recent_lines(entries: &[TranscriptEntry], count: usize) -> String {
    let skip = entries.len().saturating_sub(count);
    entries[skip..]
        .iter()
        .map(TranscriptEntry::line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Short plain-text status of a running meeting.
pub fn summary_text(meeting: &Meeting, now: DateTime<Utc>) -> String {
    if meeting.transcripts.is_empty() {
        return "No transcripts available yet.".to_string();
    }

    format!(
        "Meeting Summary:\n- Participants: {}\n- Duration: {} minutes\n- Recent discussion:\n{}",
        meeting.participants.len(),
        meeting.duration_minutes(now),
        recent_lines(&meeting.transcripts, SUMMARY_RECENT_LINES)
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeakerContribution {
    pub speaker: String,
    pub segments: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeetingReport {
    pub meeting_id: String,
    pub title: String,
    pub meeting_uri: String,
    pub date: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_minutes: i64,
    pub status: String,
    pub participants: Vec<String>,
    pub summary: String,
    pub transcript_segments: usize,
    pub speakers: Vec<SpeakerContribution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_transcript: Option<Vec<TranscriptEntry>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recordings: Vec<String>,
}

impl MeetingReport {
    pub fn build(meeting: &Meeting, now: DateTime<Utc>, include_transcript: bool) -> Self {
        let title = meeting.title.clone().unwrap_or_else(|| {
            format!("Meeting Report - {}", meeting.started_at.format("%Y-%m-%d"))
        });

        Self {
            meeting_id: meeting.id.clone(),
            title,
            meeting_uri: meeting.meeting_uri.clone(),
            date: meeting.started_at,
            ended_at: meeting.ended_at,
            duration_minutes: meeting.duration_minutes(now),
            status: meeting.status.as_str().to_string(),
            participants: meeting.participants.iter().map(|p| p.name.clone()).collect(),
            summary: summary_text(meeting, now),
            transcript_segments: meeting.transcripts.len(),
            speakers: speaker_contributions(&meeting.transcripts),
            full_transcript: include_transcript.then(|| meeting.transcripts.clone()),
            recordings: Vec::new(),
        }
    }

    pub fn with_recordings(mut self, recordings: Vec<String>) -> Self {
        self.recordings = recordings;
        self
    }

    /// Plain-text rendering for chat replies.
    pub fn to_text(&self) -> String {
        let mut out = format!(
            "Meeting Report: {}\nMeeting ID: {}\nDate: {}\nDuration: {} minutes\nStatus: {}\n",
            self.title,
            self.meeting_id,
            self.date.format("%Y-%m-%d %H:%M UTC"),
            self.duration_minutes,
            self.status
        );

        if self.participants.is_empty() {
            out.push_str("Participants: none recorded\n");
        } else {
            out.push_str(&format!("Participants: {}\n", self.participants.join(", ")));
        }

        out.push_str(&format!("Transcript segments: {}\n", self.transcript_segments));
        for speaker in &self.speakers {
            out.push_str(&format!("  {}: {} segments\n", speaker.speaker, speaker.segments));
        }

        out.push_str(&format!("\n{}\n", self.summary));

        if !self.recordings.is_empty() {
            out.push_str("\nRecordings:\n");
            for link in &self.recordings {
                out.push_str(&format!("  {}\n", link));
            }
        }

        if let Some(transcript) = &self.full_transcript {
            out.push_str("\nFull transcript:\n");
            out.push_str(&transcript_text(transcript));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meeting::model::MeetingStatus;
    use chrono::Duration;

    fn meeting_with_lines(lines: usize) -> Meeting {
        let start = Utc::now() - Duration::minutes(7);
        let mut meeting = Meeting::new(
            "m1",
            "abc-defg-hij",
            "https://meet.google.com/abc-defg-hij",
            start,
            MeetingStatus::Active,
        );
        meeting.participant_joined("a", "Ann", start);
        meeting.participant_joined("b", "Bob", start);
        for i in 0..lines {
            let speaker = if i % 2 == 0 { "Ann" } else { "Bob" };
            meeting.push_transcript(TranscriptEntry::new(
                speaker,
                speaker,
                format!("line {}", i),
                start + Duration::seconds(i as i64),
                1.0,
            ));
        }
        meeting
    }

    #[test]
    fn test_transcript_text() {
        let meeting = meeting_with_lines(2);
        assert_eq!(
            transcript_text(&meeting.transcripts),
            "Ann: line 0\nBob: line 1\n"
        );
    }

    #[test]
    fn test_summary_keeps_last_ten_lines() {
        let meeting = meeting_with_lines(14);
        let text = summary_text(&meeting, Utc::now());
        assert!(text.contains("- Participants: 2"));
        assert!(text.contains("- Duration: 7 minutes"));
        assert!(!text.contains("line 3\n"));
        assert!(text.contains("Ann: line 4"));
        assert!(text.ends_with("Bob: line 13"));
    }

    #[test]
    fn test_summary_without_transcripts() {
        let meeting = meeting_with_lines(0);
        assert_eq!(
            summary_text(&meeting, Utc::now()),
            "No transcripts available yet."
        );
    }

    #[test]
    fn test_speaker_contributions_order() {
        let meeting = meeting_with_lines(5);
        let stats = speaker_contributions(&meeting.transcripts);
        assert_eq!(
            stats,
            vec![
                SpeakerContribution { speaker: "Ann".into(), segments: 3 },
                SpeakerContribution { speaker: "Bob".into(), segments: 2 },
            ]
        );
    }

    #[test]
    fn test_report_transcript_is_optional() {
        let meeting = meeting_with_lines(3);
        let report = MeetingReport::build(&meeting, Utc::now(), false);
        assert!(report.full_transcript.is_none());
        assert_eq!(report.transcript_segments, 3);
        assert!(report.title.starts_with("Meeting Report - "));

        let report = MeetingReport::build(&meeting, Utc::now(), true)
            .with_recordings(vec!["https://drive.google.com/x".into()]);
        let text = report.to_text();
        assert!(text.contains("Full transcript:\nAnn: line 0\n"));
        assert!(text.contains("https://drive.google.com/x"));
    }
}
