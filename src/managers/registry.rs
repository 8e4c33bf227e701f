use crate::managers::refresh::RefreshConfig;
use crate::managers::view::{SessionServices, SessionView, ViewConfig, ViewScope};
use crate::meeting::SessionKey;
use crate::storage::IntentScope;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Views currently mounted, one per session key.
///
/// The lock only guards the map. Loading a view happens outside it, so a
/// slow backend never blocks lookups or unmounts of other views.
pub struct ViewRegistry {
    services: SessionServices,
    refresh: RefreshConfig,
    views: Mutex<HashMap<SessionKey, Arc<SessionView>>>,
}

impl ViewRegistry {
    pub fn new(services: SessionServices, refresh: RefreshConfig) -> Self {
        Self {
            services,
            refresh,
            views: Mutex::new(HashMap::new()),
        }
    }

    /// Mount a view, or return the one already mounted for this key. The
    /// flag is true when this call mounted it. If a concurrent mount of the
    /// same key finished first, that view wins and ours is closed.
    pub async fn mount(
        &self,
        meeting_id: String,
        scope: ViewScope,
        intent_scope: IntentScope,
    ) -> (Arc<SessionView>, bool) {
        let key = scope.key_for(&meeting_id);
        if let Some(view) = self.views.lock().await.get(&key) {
            return (view.clone(), false);
        }

        let view = Arc::new(
            SessionView::mount(
                ViewConfig {
                    meeting_id,
                    scope,
                    intent_scope,
                    refresh: self.refresh.clone(),
                },
                self.services.clone(),
            )
            .await,
        );

        let mut views = self.views.lock().await;
        if let Some(existing) = views.get(&key) {
            log::debug!("Session {} was mounted concurrently, closing duplicate", key);
            view.close();
            return (existing.clone(), false);
        }
        views.insert(key, view.clone());
        (view, true)
    }

    pub async fn get(&self, key: &SessionKey) -> Option<Arc<SessionView>> {
        self.views.lock().await.get(key).cloned()
    }

    /// Close and forget the view for `key`.
    pub async fn unmount(&self, key: &SessionKey) -> bool {
        let view = self.views.lock().await.remove(key);
        match view {
            Some(view) => {
                view.close();
                true
            }
            None => false,
        }
    }

    /// Forget every view of a meeting, drill-downs included. Returns how
    /// many were closed.
    pub async fn forget_meeting(&self, meeting_id: &str) -> usize {
        let removed: Vec<Arc<SessionView>> = {
            let mut views = self.views.lock().await;
            let keys: Vec<SessionKey> = views
                .keys()
                .filter(|key| key.meeting_id == meeting_id)
                .cloned()
                .collect();
            keys.iter().filter_map(|key| views.remove(key)).collect()
        };
        for view in &removed {
            view.close();
        }
        removed.len()
    }
}
