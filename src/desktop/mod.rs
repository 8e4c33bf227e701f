//! Tauri host shell around the session core.

pub mod store;
pub mod window;

use crate::commands;
use crate::integrations::HttpBackend;
use crate::logging;
use crate::managers::{SessionServices, SessionSnapshot, SessionView, ViewRegistry, ViewScope};
use crate::meeting::SessionKey;
use crate::push::PollingTransport;
use crate::settings::{self, DashboardSettings};
use crate::storage::{IntentScope, IntentStore, JsonFileIntentStore};
use serde::Serialize;
use std::sync::Arc;
use store::TauriIntentStore;
use tauri::{AppHandle, Emitter, Manager};

pub use window::TauriFloatingDisplay;

pub const SNAPSHOT_EVENT: &str = "session-snapshot";
pub const DELETED_EVENT: &str = "session-deleted";

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEvent {
    pub key: SessionKey,
    pub snapshot: SessionSnapshot,
}

/// Host state: settings plus the registry of mounted views.
pub struct DesktopState {
    pub settings: DashboardSettings,
    registry: ViewRegistry,
}

impl DesktopState {
    fn initialize(app: &AppHandle) -> anyhow::Result<Self> {
        let settings = settings::load_or_create_settings(&settings::default_settings_path()?)?;

        let backend = Arc::new(HttpBackend::new(
            &settings.backend_endpoint,
            settings.request_timeout(),
        )?);
        let transport = Arc::new(PollingTransport::new(
            settings.push_endpoint(),
            settings.request_timeout(),
        )?);
        let store: Arc<dyn IntentStore> = match &settings.intent_store_path {
            Some(path) => Arc::new(JsonFileIntentStore::open(path.clone())?),
            None => Arc::new(TauriIntentStore::open(app)?),
        };

        log::info!(
            "Dashboard backend: {}, push: {}",
            settings.backend_endpoint,
            settings.push_endpoint()
        );

        let registry = ViewRegistry::new(
            SessionServices {
                backend,
                store,
                transport,
            },
            settings.refresh_config(),
        );
        Ok(Self { settings, registry })
    }

    /// Mount a view, or return the one already mounted for this key.
    ///
    /// A freshly mounted view gets a forwarder that emits every snapshot to
    /// the webview. It ends once the view is gone and its state dropped.
    pub async fn mount(
        &self,
        app: &AppHandle,
        meeting_id: String,
        scope: ViewScope,
        intent_scope: IntentScope,
    ) -> Arc<SessionView> {
        let (view, mounted) = self.registry.mount(meeting_id, scope, intent_scope).await;
        if mounted {
            let app = app.clone();
            let key = view.key().clone();
            let mut snapshots = view.subscribe();
            tauri::async_runtime::spawn(async move {
                while snapshots.changed().await.is_ok() {
                    let snapshot = snapshots.borrow_and_update().clone();
                    let event = SnapshotEvent {
                        key: key.clone(),
                        snapshot,
                    };
                    if let Err(e) = app.emit(SNAPSHOT_EVENT, event) {
                        log::warn!("Failed to emit snapshot for {}: {}", key, e);
                    }
                }
            });
        }
        view
    }

    pub async fn view(&self, key: &SessionKey) -> Result<Arc<SessionView>, String> {
        self.registry
            .get(key)
            .await
            .ok_or_else(|| format!("Session {} is not mounted", key))
    }

    pub async fn unmount(&self, key: &SessionKey) -> bool {
        self.registry.unmount(key).await
    }

    /// Forget every view of a deleted meeting and tell the webview.
    pub async fn forget_meeting(&self, app: &AppHandle, meeting_id: &str) {
        let closed = self.registry.forget_meeting(meeting_id).await;
        log::debug!("Closed {} view(s) of deleted meeting {}", closed, meeting_id);
        if let Err(e) = app.emit(DELETED_EVENT, meeting_id) {
            log::warn!("Failed to emit deletion of {}: {}", meeting_id, e);
        }
    }
}

pub fn run() {
    logging::init();

    let result = tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_store::Builder::default().build())
        .setup(|app| {
            let state = DesktopState::initialize(app.handle())?;
            app.manage(state);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::session::mount_session,
            commands::session::unmount_session,
            commands::session::refresh_session,
            commands::session::get_session_snapshot,
            commands::session::start_meeting,
            commands::session::end_meeting,
            commands::session::delete_meeting,
            commands::session::set_recognition_requested,
            commands::session::get_recognition_requested,
            commands::session::open_floating_display,
            commands::session::open_join_link,
            commands::set_access_token,
            commands::has_access_token,
        ])
        .run(tauri::generate_context!());

    if let Err(e) = result {
        log::error!("Error while running tauri application: {}", e);
    }
}
