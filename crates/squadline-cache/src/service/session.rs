//! Session records under the `session:` namespace.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::CacheService;
use crate::error::CodecError;
use crate::keys::SESSION_PREFIX;

/// An authenticated user session as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub session_id: String,
    pub user_id: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    /// Advisory telemetry; not an authorization input.
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Session {
    /// New session stamped with the current time and no permissions.
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        email: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            email: email.into(),
            role: role.into(),
            permissions: BTreeSet::new(),
            last_activity: OffsetDateTime::now_utc(),
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Move `last_activity` to now, never backwards and never to the same instant.
    fn touch(&mut self) {
        let now = OffsetDateTime::now_utc();
        self.last_activity = if now > self.last_activity {
            now
        } else {
            self.last_activity + time::Duration::milliseconds(1)
        };
    }
}

impl CacheService {
    /// Store `session` under `session:<session_id>`. `None` TTL uses the
    /// configured session TTL (24h by default); `Some(0)` stores without expiry.
    pub async fn set_session(
        &self,
        session_id: &str,
        session: &Session,
        ttl_secs: Option<u64>,
    ) -> Result<(), CodecError> {
        let ttl = ttl_secs.or(Some(self.session_ttl_secs));
        self.set(session_id, session, ttl, Some(SESSION_PREFIX)).await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>, CodecError> {
        let session = self.get::<Session>(session_id, Some(SESSION_PREFIX)).await?;
        Ok(session.map(|mut s| {
            if s.session_id.is_empty() {
                s.session_id = session_id.to_string();
            }
            s
        }))
    }

    pub async fn delete_session(&self, session_id: &str) -> bool {
        self.delete(session_id, Some(SESSION_PREFIX)).await
    }

    /// Read the session, stamp `last_activity`, and write it back with a fresh
    /// session TTL. Returns the updated session, or `None` if there was none.
    ///
    /// Read-modify-write without a version check: concurrent updates to the
    /// same session race and the last write wins.
    pub async fn update_session_activity(&self, session_id: &str) -> Result<Option<Session>, CodecError> {
        let Some(mut session) = self.get_session(session_id).await? else {
            tracing::debug!(session_id, "session activity update skipped, no session");
            return Ok(None);
        };
        session.touch();
        self.set_session(session_id, &session, None).await?;
        Ok(Some(session))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::memory_service;
    use super::*;
    use crate::store::KeyValueStore;

    fn coach() -> Session {
        Session::new("s-1", "u-42", "coach@squadline.app", "coach")
            .with_permissions(["squad:read", "squad:write"])
            .with_client(Some("10.0.0.7".into()), None)
    }

    #[tokio::test]
    async fn test_session_roundtrip_under_namespace() {
        let (cache, store) = memory_service().await;
        let session = coach();
        cache.set_session("s-1", &session, None).await.unwrap();

        assert!(store.exists("session:s-1").await.unwrap());
        assert_eq!(cache.get_session("s-1").await.unwrap(), Some(session));
        assert_eq!(cache.get_ttl("s-1", Some(SESSION_PREFIX)).await, 86_400);
    }

    #[tokio::test]
    async fn test_wire_format_is_camel_case() {
        let (cache, store) = memory_service().await;
        cache.set_session("s-1", &coach(), None).await.unwrap();

        let raw = store.get("session:s-1").await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["userId"], "u-42");
        assert_eq!(json["ipAddress"], "10.0.0.7");
        assert!(json["lastActivity"].is_string());
        assert!(json.get("userAgent").is_none());
    }

    #[tokio::test]
    async fn test_missing_session_id_is_filled_on_read() {
        let (cache, store) = memory_service().await;
        let raw = br#"{"userId":"u-1","email":"a@b.c","role":"player","lastActivity":"2024-05-01T10:00:00Z"}"#;
        store.set("session:legacy", raw, None).await.unwrap();

        let session = cache.get_session("legacy").await.unwrap().unwrap();
        assert_eq!(session.session_id, "legacy");
        assert!(session.permissions.is_empty());
    }

    #[tokio::test]
    async fn test_update_activity_moves_forward() {
        let (cache, _) = memory_service().await;
        let before = coach();
        cache.set_session("s-1", &before, Some(60)).await.unwrap();

        let after = cache.update_session_activity("s-1").await.unwrap().unwrap();
        assert!(after.last_activity > before.last_activity);
        assert_eq!(after.user_id, before.user_id);
        assert_eq!(after.permissions, before.permissions);
        assert!(after.has_permission("squad:write"));

        let stored = cache.get_session("s-1").await.unwrap().unwrap();
        assert_eq!(stored.last_activity, after.last_activity);
        assert_eq!(cache.get_ttl("s-1", Some(SESSION_PREFIX)).await, 86_400);
    }

    #[tokio::test]
    async fn test_update_activity_with_future_timestamp() {
        let (cache, _) = memory_service().await;
        let mut skewed = coach();
        skewed.last_activity = OffsetDateTime::now_utc() + time::Duration::hours(1);
        cache.set_session("s-1", &skewed, None).await.unwrap();

        let after = cache.update_session_activity("s-1").await.unwrap().unwrap();
        assert!(after.last_activity > skewed.last_activity);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_session() {
        let (cache, _) = memory_service().await;
        assert_eq!(cache.update_session_activity("nope").await.unwrap(), None);
        assert!(!cache.delete_session("nope").await);

        cache.set_session("s-1", &coach(), None).await.unwrap();
        assert!(cache.delete_session("s-1").await);
        assert_eq!(cache.get_session("s-1").await.unwrap(), None);
    }
}
