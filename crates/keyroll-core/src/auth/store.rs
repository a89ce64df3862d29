//! Local token store for interactive sessions.

use super::types::AuthSession;
use crate::error::AuthError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// JSON file holding the persisted session.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored session. A missing file is not an error.
    pub async fn load(&self) -> Result<Option<AuthSession>, AuthError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.error(e)),
        };

        let session = serde_json::from_str(&content).map_err(|e| self.error(e))?;
        debug!(path = %self.path.display(), "Loaded stored session");
        Ok(Some(session))
    }

    /// Persist the session, readable by the owner only.
    pub async fn save(&self, session: &AuthSession) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.error(e))?;
        }

        let content = serde_json::to_string_pretty(session).map_err(|e| self.error(e))?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| self.error(e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| self.error(e))?;
        }

        debug!(path = %self.path.display(), "Saved session");
        Ok(())
    }

    /// Remove the stored session. Returns whether a file was deleted.
    pub async fn delete(&self) -> Result<bool, AuthError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.error(e)),
        }
    }

    fn error(&self, e: impl std::fmt::Display) -> AuthError {
        AuthError::Store {
            path: self.path.clone(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::{GOOGLE_TOKEN_URI, ScopeSet, UseCase};
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn session() -> AuthSession {
        AuthSession {
            access_token: "ya29.stored".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            scopes: ScopeSet::for_use_case(UseCase::RotateAndNotify),
            token_uri: GOOGLE_TOKEN_URI.to_string(),
            client_id: "client".to_string(),
            client_secret: Some("secret".to_string()),
        }
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let temp = TempDir::new().unwrap();
        let store = TokenStore::new(temp.path().join("token.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let store = TokenStore::new(temp.path().join("nested").join("token.json"));

        store.save(&session()).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();

        assert_eq!(loaded.access_token, "ya29.stored");
        assert_eq!(loaded.scopes, ScopeSet::for_use_case(UseCase::RotateAndNotify));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let store = TokenStore::new(temp.path().join("token.json"));
        store.save(&session()).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_corrupted_store_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("token.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = TokenStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, AuthError::Store { .. }));
    }

    #[tokio::test]
    async fn test_delete() {
        let temp = TempDir::new().unwrap();
        let store = TokenStore::new(temp.path().join("token.json"));

        assert!(!store.delete().await.unwrap());
        store.save(&session()).await.unwrap();
        assert!(store.delete().await.unwrap());
        assert!(store.load().await.unwrap().is_none());
    }
}
