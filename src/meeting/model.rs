use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Three-phase status of a meeting. Ordered, so merges can take the max.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    NotStarted,
    Started,
    Ended,
}

impl LifecycleState {
    /// Derive the lifecycle from the backend's pair of flags.
    pub fn from_flags(is_start: bool, is_ended: bool) -> Self {
        if is_ended {
            LifecycleState::Ended
        } else if is_start {
            LifecycleState::Started
        } else {
            LifecycleState::NotStarted
        }
    }

    /// Monotonic merge: `Ended` is terminal and `Started` never reverts.
    pub fn merge(self, fetched: LifecycleState) -> LifecycleState {
        self.max(fetched)
    }

    pub fn is_started(self) -> bool {
        self == LifecycleState::Started
    }

    pub fn is_ended(self) -> bool {
        self == LifecycleState::Ended
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::NotStarted => "not_started",
            LifecycleState::Started => "started",
            LifecycleState::Ended => "ended",
        };
        f.write_str(s)
    }
}

/// Identity of a mounted view. Immutable for the life of the view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub meeting_id: String,
    /// Set for the per-user drill-down variant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
}

impl SessionKey {
    pub fn meeting(meeting_id: impl Into<String>) -> Self {
        Self {
            meeting_id: meeting_id.into(),
            participant_id: None,
        }
    }

    pub fn participant(meeting_id: impl Into<String>, participant_id: impl Into<String>) -> Self {
        Self {
            meeting_id: meeting_id.into(),
            participant_id: Some(participant_id.into()),
        }
    }

    /// `<meetingId>` or `<meetingId>-<participantId>`
    pub fn compound(&self) -> String {
        match &self.participant_id {
            Some(participant) => format!("{}-{}", self.meeting_id, participant),
            None => self.meeting_id.clone(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.compound())
    }
}

/// Per-meeting display configuration, passed through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeetingConfiguration {
    #[serde(default)]
    pub notification: Value,
    #[serde(default)]
    pub sound: Value,
    #[serde(default)]
    pub remind_below: Value,
    #[serde(default)]
    pub size: Value,
    #[serde(default)]
    pub emotion_display: Value,
}

/// Meeting record as returned by `GET /meetings/{id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeetingDetail {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub link: String,
    pub code: String,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub is_start: bool,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub is_ended: bool,
    #[serde(default)]
    pub ended_at: Option<String>,
    #[serde(default)]
    pub configuration: MeetingConfiguration,
}

impl MeetingDetail {
    pub fn lifecycle(&self) -> LifecycleState {
        LifecycleState::from_flags(self.is_start, self.is_ended)
    }
}

/// One meeting under observation by a view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub key: SessionKey,
    /// Backend session code, used for recognition calls and room names
    pub code: String,
    pub lifecycle: LifecycleState,
    pub detail: MeetingDetail,
}

/// Header actions the presentation layer may offer for a session.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct AvailableActions {
    pub start_meeting: bool,
    pub end_meeting: bool,
    pub floating_display: bool,
    pub recognition_switch: bool,
}

impl Session {
    pub fn from_detail(key: SessionKey, detail: MeetingDetail) -> Self {
        Self {
            key,
            code: detail.code.clone(),
            lifecycle: detail.lifecycle(),
            detail,
        }
    }

    pub fn available_actions(&self) -> AvailableActions {
        let live = self.lifecycle.is_started();
        AvailableActions {
            start_meeting: self.lifecycle == LifecycleState::NotStarted,
            end_meeting: live,
            floating_display: live,
            recognition_switch: live,
        }
    }

    /// The join link stops being offered once the meeting has ended.
    pub fn joinable_link(&self) -> Option<&str> {
        if self.lifecycle.is_ended() || self.detail.link.is_empty() {
            None
        } else {
            Some(self.detail.link.as_str())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(alias = "name", default)]
    pub display_name: String,
    #[serde(alias = "createdAt", default)]
    pub joined_at: Option<DateTime<Utc>>,
}

/// Analytic bundle computed by the backend. Replaced wholesale on refresh.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecognitionProjection {
    #[serde(rename = "recognitionsOverview", default)]
    pub overview: Value,
    #[serde(rename = "recognitionsSummary", default)]
    pub summary: Value,
    #[serde(rename = "recognitionStream", alias = "recognitionsDetail", default)]
    pub stream: Value,
}
