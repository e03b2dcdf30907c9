//! Pattern-based invalidation.

use super::CacheService;
use crate::keys::escape_glob;

/// Patterns removed by [`CacheService::invalidate_user_data`], with `{id}`
/// standing for the user id. The id is glob-escaped before substitution, so
/// an id like `*` only matches keys that contain it literally.
///
/// `session:*` is not scoped to the user: changing one user's data logs out
/// every user.
pub const USER_DATA_PATTERNS: [&str; 4] = ["user:{id}:*", "session:*", "profile:{id}", "stats:{id}:*"];

impl CacheService {
    /// Delete every key matching `pattern`. Returns the number removed.
    pub async fn invalidate_pattern(&self, pattern: &str) -> u64 {
        let removed = self.delete_by_pattern(pattern, None).await;
        tracing::debug!(pattern, removed, "cache pattern invalidated");
        removed
    }

    /// Delete everything cached for `user_id`, plus all sessions.
    pub async fn invalidate_user_data(&self, user_id: &str) -> u64 {
        let id = escape_glob(user_id);
        let mut removed = 0;
        for template in USER_DATA_PATTERNS {
            removed += self.invalidate_pattern(&template.replace("{id}", &id)).await;
        }
        tracing::info!(user_id, removed, "Invalidated cached user data");
        removed
    }
}
