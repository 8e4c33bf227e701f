use crate::bridge::FloatingDisplay;
use crate::error::{Result, SessionError};
use crate::settings::FloatingDisplaySettings;
use serde_json::json;
use tauri::{AppHandle, Manager, WebviewUrl, WebviewWindowBuilder};

/// Opens the floating recognition window for a session.
pub struct TauriFloatingDisplay {
    app: AppHandle,
    settings: FloatingDisplaySettings,
}

impl TauriFloatingDisplay {
    pub fn new(app: AppHandle, settings: FloatingDisplaySettings) -> Self {
        Self { app, settings }
    }
}

/// Window labels only allow a restricted alphabet.
fn window_label(session_code: &str) -> String {
    let code: String = session_code
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("floating-{}", code)
}

impl FloatingDisplay for TauriFloatingDisplay {
    fn open_floating_display(&self, session_code: &str, token: &str) -> Result<()> {
        let label = window_label(session_code);

        if let Some(window) = self.app.get_webview_window(&label) {
            if let Err(e) = window.show() {
                log::warn!("Failed to show floating window {}: {}", label, e);
            }
            if let Err(e) = window.set_focus() {
                log::warn!("Failed to focus floating window {}: {}", label, e);
            }
            return Ok(());
        }

        let bootstrap = format!(
            "window.__FER_FLOATING__ = {};",
            json!({ "code": session_code, "token": token })
        );
        WebviewWindowBuilder::new(&self.app, &label, WebviewUrl::App("index.html".into()))
            .title(format!("FER - {}", session_code))
            .inner_size(self.settings.width, self.settings.height)
            .always_on_top(self.settings.always_on_top)
            .initialization_script(&bootstrap)
            .build()
            .map_err(|e| SessionError::Bridge(format!("Failed to open floating window: {}", e)))?;

        log::info!("Opened floating display for {}", session_code);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_label_is_sanitized() {
        assert_eq!(window_label("abc-defg-hij"), "floating-abc-defg-hij");
        assert_eq!(window_label("a b/c"), "floating-a_b_c");
    }
}
