pub mod model;

pub use model::{
    AvailableActions, LifecycleState, MeetingConfiguration, MeetingDetail, Participant,
    RecognitionProjection, Session, SessionKey,
};
