use anyhow::{bail, Context, Result};
use ferdash_app_lib::integrations::HttpBackend;
use ferdash_app_lib::logging;
use ferdash_app_lib::push::PollingTransport;
use ferdash_app_lib::settings;
use ferdash_app_lib::storage::{IntentScope, JsonFileIntentStore};
use ferdash_app_lib::{SessionServices, SessionView, ViewConfig, ViewScope};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

struct ProbeArgs {
    meeting_id: String,
    participant_id: Option<String>,
    config: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<ProbeArgs> {
    let mut positional = Vec::new();
    let mut config = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter.next().context("--config needs a path")?;
            config = Some(PathBuf::from(path));
        } else {
            positional.push(arg.clone());
        }
    }

    let mut positional = positional.into_iter();
    let Some(meeting_id) = positional.next() else {
        bail!("Usage: session_probe <meeting_id> [participant_id] [--config <settings.toml>]");
    };
    Ok(ProbeArgs {
        meeting_id,
        participant_id: positional.next(),
        config,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let args = parse_args(&args)?;

    let settings_path = match args.config {
        Some(path) => path,
        None => settings::default_settings_path()?,
    };
    let settings = settings::load_or_create_settings(&settings_path)?;
    let store_path = match &settings.intent_store_path {
        Some(path) => path.clone(),
        None => JsonFileIntentStore::default_path()?,
    };

    let services = SessionServices {
        backend: Arc::new(HttpBackend::new(
            &settings.backend_endpoint,
            settings.request_timeout(),
        )?),
        store: Arc::new(JsonFileIntentStore::open(store_path)?),
        transport: Arc::new(PollingTransport::new(
            settings.push_endpoint(),
            settings.request_timeout(),
        )?),
    };

    let scope = args
        .participant_id
        .map_or(ViewScope::Meeting, ViewScope::Participant);
    let view = SessionView::mount(
        ViewConfig {
            meeting_id: args.meeting_id,
            scope,
            intent_scope: IntentScope::Meeting,
            refresh: settings.refresh_config(),
        },
        services,
    )
    .await;

    let mut snapshots = view.subscribe();
    log::info!("{}", serde_json::to_string_pretty(&view.snapshot())?);

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                log::info!("{}", serde_json::to_string_pretty(&snapshot)?);
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, closing view");
                break;
            }
        }
    }

    view.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        let parsed = parse_args(&strings(&["m1", "u7", "--config", "/tmp/s.toml"])).unwrap();
        assert_eq!(parsed.meeting_id, "m1");
        assert_eq!(parsed.participant_id.as_deref(), Some("u7"));
        assert_eq!(parsed.config, Some(PathBuf::from("/tmp/s.toml")));

        assert!(parse_args(&[]).is_err());
        assert!(parse_args(&strings(&["m1", "--config"])).is_err());
    }
}
