pub mod bridge;
#[cfg(feature = "desktop")]
mod commands;
#[cfg(feature = "desktop")]
pub mod desktop;
pub mod error;
pub mod integrations;
pub mod logging;
pub mod managers;
pub mod meeting;
pub mod push;
pub mod settings;
pub mod storage;

pub use error::{Result, SessionError};
pub use managers::{SessionServices, SessionSnapshot, SessionView, ViewConfig, ViewScope};

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    desktop::run();
}
