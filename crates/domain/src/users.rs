use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::DomainResult;
use crate::ports::BoxFuture;
use crate::ports::store::DocumentStore;
use crate::ports::users::UserDirectory;

pub const USERS: &str = "users";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: String,
    pub profile_picture: Option<String>,
}

impl UserProfile {
    /// Stand-in used when the directory has no record for the user.
    pub fn anonymous(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            display_name: user_id.to_string(),
            profile_picture: None,
        }
    }
}

/// Looks a profile up and falls back to the bare user id.
pub async fn resolve_profile(directory: &dyn UserDirectory, user_id: &str) -> UserProfile {
    match directory.get_profile(user_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => UserProfile::anonymous(user_id),
        Err(err) => {
            tracing::warn!(user_id, error = %err, "user profile lookup failed");
            UserProfile::anonymous(user_id)
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryUserDirectory {
    profiles: Arc<RwLock<HashMap<String, UserProfile>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, profile: UserProfile) {
        self.profiles
            .write()
            .await
            .insert(profile.user_id.clone(), profile);
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn get_profile(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Option<UserProfile>>> {
        let user_id = user_id.to_string();
        let profiles = self.profiles.clone();
        Box::pin(async move { Ok(profiles.read().await.get(&user_id).cloned()) })
    }
}

/// Reads profiles owned by the user service from the `users` collection.
#[derive(Clone)]
pub struct StoreUserDirectory {
    store: Arc<dyn DocumentStore>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UserDocument {
    first_name: String,
    last_name: String,
    username: String,
    profile_pic_url: Option<String>,
}

impl StoreUserDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

impl UserDirectory for StoreUserDirectory {
    fn get_profile(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Option<UserProfile>>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            let Some(document) = self.store.get(USERS, &user_id).await? else {
                return Ok(None);
            };
            let row: UserDocument =
                serde_json::from_value(serde_json::Value::Object(document)).unwrap_or_default();
            let full_name = format!("{} {}", row.first_name.trim(), row.last_name.trim());
            let display_name = [full_name.trim(), row.username.trim(), user_id.as_str()]
                .into_iter()
                .find(|candidate| !candidate.is_empty())
                .unwrap_or_default()
                .to_string();
            Ok(Some(UserProfile {
                user_id,
                display_name,
                profile_picture: row.profile_pic_url.filter(|url| !url.trim().is_empty()),
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDocumentStore;
    use serde_json::json;

    #[tokio::test]
    async fn store_directory_builds_display_name_from_user_document() {
        let store = InMemoryDocumentStore::new();
        store
            .set(
                USERS,
                "u1",
                json!({"firstName": "Ada", "lastName": "Tan", "profilePicUrl": "https://cdn/a.png"})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .await
            .unwrap();
        store
            .set(
                USERS,
                "u2",
                json!({"username": "kite"}).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();
        let directory = StoreUserDirectory::new(Arc::new(store));

        let ada = directory.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(ada.display_name, "Ada Tan");
        assert_eq!(ada.profile_picture.as_deref(), Some("https://cdn/a.png"));

        let kite = directory.get_profile("u2").await.unwrap().unwrap();
        assert_eq!(kite.display_name, "kite");
        assert_eq!(kite.profile_picture, None);

        assert!(directory.get_profile("u3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resolve_profile_falls_back_to_user_id() {
        let directory = InMemoryUserDirectory::new();
        let profile = resolve_profile(&directory, "ghost").await;
        assert_eq!(profile, UserProfile::anonymous("ghost"));
    }
}
