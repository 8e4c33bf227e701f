pub mod session;

use crate::integrations::credentials;

/// Store the token handed to the floating display.
#[tauri::command]
pub fn set_access_token(token: String) -> Result<(), String> {
    let token = token.trim();
    if token.is_empty() {
        credentials::delete_access_token().map_err(|e| e.to_string())
    } else {
        credentials::store_access_token(token).map_err(|e| e.to_string())
    }
}

#[tauri::command]
pub fn has_access_token() -> bool {
    credentials::has_access_token()
}
