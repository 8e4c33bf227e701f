use crate::error::Result;
use crate::meeting::{MeetingDetail, Participant, RecognitionProjection};
use async_trait::async_trait;

/// REST collaborator owning meetings and recognition analytics.
///
/// Meetings are addressed by their database id; recognition calls take the
/// short session code carried in the meeting detail.
#[async_trait]
pub trait MeetingBackend: Send + Sync {
    async fn get_session_by_id(&self, meeting_id: &str) -> Result<MeetingDetail>;

    async fn set_session_status(&self, meeting_id: &str, started: bool, ended: bool) -> Result<()>;

    async fn remove_session(&self, meeting_id: &str) -> Result<()>;

    async fn start_recognition(&self, code: &str) -> Result<()>;

    async fn stop_recognition(&self, code: &str) -> Result<()>;

    /// Meeting-wide projection; `limit` caps the stream length
    async fn get_recognition(&self, code: &str, limit: Option<u32>)
        -> Result<RecognitionProjection>;

    /// Projection for one participant (drill-down view)
    async fn get_participant_recognition(
        &self,
        code: &str,
        participant_id: &str,
        limit: Option<u32>,
    ) -> Result<RecognitionProjection>;

    async fn get_participants(&self, meeting_id: &str) -> Result<Vec<Participant>>;
}
