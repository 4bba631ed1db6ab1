//! Push notification config store — persistence for per-task webhook configs.
//!
//! Mirrors the shape of [`super::task_store::TaskStore`]: a small async trait
//! plus an in-memory reference implementation, so a production deployment can
//! swap in a database-backed store without touching the request handler.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::A2AResult;
use crate::types::{PushNotificationConfig, TaskPushNotificationConfig};

/// Trait for persisting and retrieving per-task push notification configs.
///
/// A task may have more than one configured callback (e.g. one webhook per
/// subscribing system), distinguished by `PushNotificationConfig.id`.
#[async_trait]
pub trait PushNotificationConfigStore: Send + Sync {
    /// Save a config for a task, assigning an id if the config doesn't carry
    /// one already. Returns the stored config wrapped with its `task_id`.
    async fn save(
        &self,
        task_id: &str,
        config: PushNotificationConfig,
    ) -> A2AResult<TaskPushNotificationConfig>;

    /// Retrieve a single config. `config_id = None` returns the first config
    /// on file for the task, matching the common case of one callback per task.
    async fn get(
        &self,
        task_id: &str,
        config_id: Option<&str>,
    ) -> A2AResult<Option<TaskPushNotificationConfig>>;

    /// List every config registered for a task.
    async fn list(&self, task_id: &str) -> A2AResult<Vec<TaskPushNotificationConfig>>;

    /// Delete a config. Silently succeeds if the config or task is absent.
    async fn delete(&self, task_id: &str, config_id: &str) -> A2AResult<()>;
}

/// In-memory push notification config store, keyed by `task_id`.
#[derive(Debug, Default)]
pub struct InMemoryPushNotificationConfigStore {
    configs: Arc<RwLock<HashMap<String, Vec<TaskPushNotificationConfig>>>>,
}

impl InMemoryPushNotificationConfigStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PushNotificationConfigStore for InMemoryPushNotificationConfigStore {
    async fn save(
        &self,
        task_id: &str,
        mut config: PushNotificationConfig,
    ) -> A2AResult<TaskPushNotificationConfig> {
        if config.id.is_none() {
            config.id = Some(Uuid::new_v4().to_string());
        }
        let entry = TaskPushNotificationConfig {
            id: config.id.clone(),
            task_id: task_id.to_string(),
            push_notification_config: config,
            tenant: None,
        };

        let mut configs = self.configs.write().await;
        let list = configs.entry(task_id.to_string()).or_default();
        list.retain(|c| c.push_notification_config.id != entry.push_notification_config.id);
        list.push(entry.clone());

        debug!(task_id = %task_id, config_id = ?entry.push_notification_config.id, "Saved push notification config");
        Ok(entry)
    }

    async fn get(
        &self,
        task_id: &str,
        config_id: Option<&str>,
    ) -> A2AResult<Option<TaskPushNotificationConfig>> {
        let configs = self.configs.read().await;
        let Some(list) = configs.get(task_id) else {
            return Ok(None);
        };
        match config_id {
            Some(id) => Ok(list
                .iter()
                .find(|c| c.push_notification_config.id.as_deref() == Some(id))
                .cloned()),
            None => Ok(list.first().cloned()),
        }
    }

    async fn list(&self, task_id: &str) -> A2AResult<Vec<TaskPushNotificationConfig>> {
        let configs = self.configs.read().await;
        Ok(configs.get(task_id).cloned().unwrap_or_default())
    }

    async fn delete(&self, task_id: &str, config_id: &str) -> A2AResult<()> {
        let mut configs = self.configs.write().await;
        if let Some(list) = configs.get_mut(task_id) {
            list.retain(|c| c.push_notification_config.id.as_deref() != Some(config_id));
        }
        Ok(())
    }
}
