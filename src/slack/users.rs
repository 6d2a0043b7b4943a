//! Run-scoped user cache
//!
//! Resolves user ids to display names. Each id is looked up at most once per
//! run, even when several workers ask for it at the same time.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

use super::client::SlackClient;
use super::types::{SlackError, SlackUser};

type Entry = Arc<OnceCell<Option<SlackUser>>>;

pub struct UserDirectory {
    client: Arc<SlackClient>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl UserDirectory {
    pub fn new(client: Arc<SlackClient>) -> Self {
        Self {
            client,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the full member list and seed the cache with it.
    pub async fn load_all(&self) -> Result<Vec<SlackUser>, SlackError> {
        let users = self.client.list_users().await?;
        self.seed(&users).await;
        tracing::info!("Loaded {} users", users.len());
        Ok(users)
    }

    pub async fn seed(&self, users: &[SlackUser]) {
        let mut entries = self.entries.lock().await;
        for user in users {
            let cell = OnceCell::new_with(Some(Some(user.clone())));
            entries.insert(user.id.clone(), Arc::new(cell));
        }
    }

    /// Look a user up, hitting `users.info` only on the first miss.
    ///
    /// Lookup failures other than auth are remembered as "unknown".
    pub async fn lookup(&self, user_id: &str) -> Result<Option<SlackUser>, SlackError> {
        let entry = {
            let mut entries = self.entries.lock().await;
            entries.entry(user_id.to_string()).or_default().clone()
        };

        let user = entry
            .get_or_try_init(|| async {
                match self.client.user_info(user_id).await {
                    Ok(user) => Ok(Some(user)),
                    Err(e) if e.is_fatal() => Err(e),
                    Err(e) => {
                        tracing::debug!("User lookup for {} failed: {}", user_id, e);
                        Ok(None)
                    }
                }
            })
            .await?;

        Ok(user.clone())
    }

    /// Display label for a user id, falling back to the id itself.
    pub async fn display_name(&self, user_id: &str) -> Result<String, SlackError> {
        Ok(self
            .lookup(user_id)
            .await?
            .map(|user| user.label().to_string())
            .unwrap_or_else(|| user_id.to_string()))
    }
}
