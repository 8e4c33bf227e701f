pub mod channel_sync;
pub mod lifecycle;
pub mod recognition;
pub mod refresh;
pub mod registry;
pub mod view;

pub use channel_sync::ChannelSync;
pub use lifecycle::LifecycleController;
pub use recognition::RecognitionToggle;
pub use refresh::{
    FetchKind, FetchOutcome, LifecycleListener, RefreshConfig, RefreshCoordinator, RefreshReport,
    RefreshScope, SessionSnapshot,
};
pub use registry::ViewRegistry;
pub use view::{SessionServices, SessionView, ViewConfig, ViewScope};
