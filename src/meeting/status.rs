//! Session state shared between a backend, its event loop and API handlers.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

use super::model::Meeting;
use crate::error::{MeetError, MeetResult};

/// Every meeting seen this session, plus which one (if any) is current.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub current_id: Option<String>,
    pub meetings: Vec<Meeting>,
}

impl SessionState {
    pub fn current(&self) -> Option<&Meeting> {
        let id = self.current_id.as_deref()?;
        self.meetings.iter().find(|m| m.id == id)
    }

    pub fn current_mut(&mut self) -> Option<&mut Meeting> {
        let id = self.current_id.clone()?;
        self.meetings.iter_mut().find(|m| m.id == id)
    }

    pub fn find(&self, id: &str) -> Option<&Meeting> {
        self.meetings.iter().find(|m| m.id == id)
    }
}

/// Thread-safe handle for sharing session state between the backend and API handlers.
#[derive(Clone)]
pub struct MeetingStatusHandle {
    inner: Arc<Mutex<SessionState>>,
    changes: Arc<watch::Sender<u64>>,
}

impl Default for MeetingStatusHandle {
    fn default() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(SessionState::default())),
            changes: Arc::new(changes),
        }
    }
}

impl MeetingStatusHandle {
    pub async fn current(&self) -> Option<Meeting> {
        self.inner.lock().await.current().cloned()
    }

    pub async fn meetings(&self) -> Vec<Meeting> {
        self.inner.lock().await.meetings.clone()
    }

    pub async fn meeting(&self, id: &str) -> Option<Meeting> {
        self.inner.lock().await.find(id).cloned()
    }

    /// Fails with `AlreadyInMeeting` while a meeting is current.
    pub async fn ensure_idle(&self) -> MeetResult<()> {
        match self.inner.lock().await.current() {
            Some(current) => Err(MeetError::AlreadyInMeeting(current.id.clone())),
            None => Ok(()),
        }
    }

    /// Make `meeting` current, replacing any earlier record with the same id.
    pub async fn set_current(&self, meeting: Meeting) {
        {
            let mut state = self.inner.lock().await;
            let id = meeting.id.clone();
            match state.meetings.iter_mut().find(|m| m.id == id) {
                Some(existing) => *existing = meeting,
                None => state.meetings.push(meeting),
            }
            state.current_id = Some(id);
        }
        self.notify();
    }

    /// Apply `f` to the current meeting. Returns `None` when there is none.
    pub async fn with_current<R>(&self, f: impl FnOnce(&mut Meeting) -> R) -> Option<R> {
        let result = {
            let mut state = self.inner.lock().await;
            state.current_mut().map(f)
        };
        if result.is_some() {
            self.notify();
        }
        result
    }

    /// Apply `f` to the meeting with `id`, current or not.
    pub async fn with_meeting<R>(&self, id: &str, f: impl FnOnce(&mut Meeting) -> R) -> Option<R> {
        let result = {
            let mut state = self.inner.lock().await;
            state.meetings.iter_mut().find(|m| m.id == id).map(f)
        };
        if result.is_some() {
            self.notify();
        }
        result
    }

    /// End the current meeting at `at` and clear it.
    pub async fn end_current(&self, at: DateTime<Utc>) -> Option<Meeting> {
        let ended = {
            let mut state = self.inner.lock().await;
            let ended = state.current_mut().map(|meeting| {
                meeting.end(at);
                meeting.clone()
            });
            state.current_id = None;
            ended
        };
        self.notify();
        ended
    }

    /// End the current meeting only if its id matches.
    pub async fn end_if_current(&self, id: &str, at: DateTime<Utc>) -> Option<Meeting> {
        let is_current = self.inner.lock().await.current_id.as_deref() == Some(id);
        if is_current {
            self.end_current(at).await
        } else {
            None
        }
    }

    /// Wait until the current meeting satisfies `pred`, or give up after `timeout`.
    pub async fn wait_for_current<F>(&self, timeout: Duration, pred: F) -> MeetResult<Meeting>
    where
        F: Fn(&Meeting) -> bool,
    {
        let mut changes = self.changes.subscribe();
        let wait = async {
            loop {
                if let Some(meeting) = self.current().await.filter(|m| pred(m)) {
                    return meeting;
                }
                if changes.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| MeetError::JoinTimeout(timeout))
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meeting::model::MeetingStatus;

    fn meeting(id: &str) -> Meeting {
        Meeting::new(
            id,
            "abc-defg-hij",
            "https://meet.google.com/abc-defg-hij",
            Utc::now(),
            MeetingStatus::Active,
        )
    }

    #[tokio::test]
    async fn test_set_and_end_current() {
        let handle = MeetingStatusHandle::default();
        assert!(handle.current().await.is_none());
        handle.ensure_idle().await.unwrap();

        handle.set_current(meeting("m1")).await;
        assert_eq!(handle.current().await.unwrap().id, "m1");
        assert!(matches!(
            handle.ensure_idle().await,
            Err(MeetError::AlreadyInMeeting(id)) if id == "m1"
        ));

        let ended = handle.end_current(Utc::now()).await.unwrap();
        assert_eq!(ended.status, MeetingStatus::Ended);
        assert!(handle.current().await.is_none());
        assert_eq!(handle.meetings().await.len(), 1);
        assert!(handle.meeting("m1").await.unwrap().is_ended());
    }

    #[tokio::test]
    async fn test_end_if_current_ignores_other_ids() {
        let handle = MeetingStatusHandle::default();
        handle.set_current(meeting("m1")).await;

        assert!(handle.end_if_current("other", Utc::now()).await.is_none());
        assert!(handle.current().await.is_some());
        assert!(handle.end_if_current("m1", Utc::now()).await.is_some());
    }

    #[tokio::test]
    async fn test_with_current_without_meeting() {
        let handle = MeetingStatusHandle::default();
        let touched = handle
            .with_current(|m| m.participant_joined("p", "P", Utc::now()))
            .await;
        assert!(touched.is_none());
    }

    #[tokio::test]
    async fn test_wait_for_current_wakes_on_change() {
        let handle = MeetingStatusHandle::default();
        let setter = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            setter.set_current(meeting("m2")).await;
        });

        let found = handle
            .wait_for_current(Duration::from_secs(2), |m| m.id == "m2")
            .await
            .unwrap();
        assert_eq!(found.id, "m2");
    }

    #[tokio::test]
    async fn test_wait_for_current_times_out() {
        let handle = MeetingStatusHandle::default();
        let err = handle
            .wait_for_current(Duration::from_millis(30), |_| true)
            .await
            .unwrap_err();
        assert!(matches!(err, MeetError::JoinTimeout(_)));
    }
}
