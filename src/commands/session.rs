use crate::desktop::{DesktopState, TauriFloatingDisplay};
use crate::integrations::credentials;
use crate::managers::{RefreshReport, SessionSnapshot, ViewScope};
use crate::meeting::{Session, SessionKey};
use crate::storage::IntentScope;
use tauri::{AppHandle, State};
use tauri_plugin_opener::OpenerExt;

fn key_for(meeting_id: &str, participant_id: Option<String>) -> SessionKey {
    match participant_id {
        Some(participant_id) => SessionKey::participant(meeting_id, participant_id),
        None => SessionKey::meeting(meeting_id),
    }
}

#[tauri::command]
pub async fn mount_session(
    app: AppHandle,
    meeting_id: String,
    participant_id: Option<String>,
    class_id: Option<String>,
    state: State<'_, DesktopState>,
) -> Result<SessionSnapshot, String> {
    let scope = participant_id.map_or(ViewScope::Meeting, ViewScope::Participant);
    let intent_scope = class_id.map_or(IntentScope::Meeting, |class_id| {
        IntentScope::ClassSession { class_id }
    });
    let view = state.mount(&app, meeting_id, scope, intent_scope).await;
    Ok(view.snapshot())
}

#[tauri::command]
pub async fn unmount_session(
    meeting_id: String,
    participant_id: Option<String>,
    state: State<'_, DesktopState>,
) -> Result<bool, String> {
    Ok(state.unmount(&key_for(&meeting_id, participant_id)).await)
}

#[tauri::command]
pub async fn refresh_session(
    meeting_id: String,
    participant_id: Option<String>,
    state: State<'_, DesktopState>,
) -> Result<RefreshReport, String> {
    let view = state.view(&key_for(&meeting_id, participant_id)).await?;
    Ok(view.refresh_now().await)
}

#[tauri::command]
pub async fn get_session_snapshot(
    meeting_id: String,
    participant_id: Option<String>,
    state: State<'_, DesktopState>,
) -> Result<SessionSnapshot, String> {
    let view = state.view(&key_for(&meeting_id, participant_id)).await?;
    Ok(view.snapshot())
}

#[tauri::command]
pub async fn start_meeting(
    meeting_id: String,
    state: State<'_, DesktopState>,
) -> Result<Session, String> {
    let view = state.view(&SessionKey::meeting(&meeting_id)).await?;
    view.request_start()
        .await
        .map_err(|e| format!("Failed to start meeting: {}", e))
}

#[tauri::command]
pub async fn end_meeting(
    meeting_id: String,
    confirmed: bool,
    state: State<'_, DesktopState>,
) -> Result<Session, String> {
    let view = state.view(&SessionKey::meeting(&meeting_id)).await?;
    view.request_end(confirmed)
        .await
        .map_err(|e| format!("Failed to end meeting: {}", e))
}

#[tauri::command]
pub async fn delete_meeting(
    app: AppHandle,
    meeting_id: String,
    confirmed: bool,
    state: State<'_, DesktopState>,
) -> Result<(), String> {
    let view = state.view(&SessionKey::meeting(&meeting_id)).await?;
    let result = view.request_delete(confirmed).await;
    if view.is_closed() {
        state.forget_meeting(&app, &meeting_id).await;
    }
    result.map_err(|e| format!("Failed to delete meeting: {}", e))
}

#[tauri::command]
pub async fn set_recognition_requested(
    meeting_id: String,
    participant_id: Option<String>,
    requested: bool,
    state: State<'_, DesktopState>,
) -> Result<(), String> {
    let view = state.view(&key_for(&meeting_id, participant_id)).await?;
    view.set_recognition_requested(requested)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn get_recognition_requested(
    meeting_id: String,
    participant_id: Option<String>,
    state: State<'_, DesktopState>,
) -> Result<bool, String> {
    let view = state.view(&key_for(&meeting_id, participant_id)).await?;
    view.recognition_requested().map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn open_floating_display(
    app: AppHandle,
    meeting_id: String,
    state: State<'_, DesktopState>,
) -> Result<(), String> {
    let view = state.view(&SessionKey::meeting(&meeting_id)).await?;
    let token = credentials::get_access_token().map_err(|e| e.to_string())?;
    let bridge = TauriFloatingDisplay::new(app, state.settings.floating_display.clone());
    view.open_floating_display(&bridge, &token)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn open_join_link(
    app: AppHandle,
    meeting_id: String,
    state: State<'_, DesktopState>,
) -> Result<(), String> {
    let view = state.view(&SessionKey::meeting(&meeting_id)).await?;
    let link = view
        .snapshot()
        .session
        .and_then(|session| session.joinable_link().map(str::to_string))
        .ok_or_else(|| "No join link available for this meeting".to_string())?;
    app.opener()
        .open_url(link, None::<&str>)
        .map_err(|e| e.to_string())
}
