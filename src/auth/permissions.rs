//! Principal resolution and permission checks.
//!
//! Every check fails closed: an unparseable credential or an unknown
//! principal yields `None`/`false`, never an error. Errors are reserved for
//! the database being unreachable.

use super::signature::{self, AuthHeader};
use crate::{
    models::{collection::Collection, user::User},
    services::registry_service::{RegistryResult, RegistryService},
};
use chrono::Utc;
use tracing::debug;

impl RegistryService {
    /// Resolve the principal named by an `Authorization` header value.
    pub async fn resolve_principal(&self, auth: &str) -> RegistryResult<Option<User>> {
        match AuthHeader::parse(auth) {
            Ok(AuthHeader::Token(token)) => self.find_user_by_token(&token).await,
            Ok(AuthHeader::Signed(cred)) => self.find_user_by_username(&cred.username).await,
            Err(err) => {
                debug!("unusable authorization header: {}", err);
                Ok(None)
            }
        }
    }

    /// Check a signed request.
    ///
    /// Accepts only when the credential was issued for `purpose` at
    /// `timestamp`, `timestamp` is within the freshness window, the principal
    /// exists, and the signature matches `payload` under the principal's
    /// token.
    pub async fn validate_request(
        &self,
        auth: &str,
        payload: &str,
        purpose: &str,
        timestamp: i64,
    ) -> RegistryResult<bool> {
        let Ok(AuthHeader::Signed(cred)) = AuthHeader::parse(auth) else {
            return Ok(false);
        };
        if cred.purpose != purpose || cred.timestamp != timestamp {
            return Ok(false);
        }
        let now = Utc::now().timestamp();
        if !signature::is_timestamp_fresh(timestamp, now, self.policy.signature_window_secs) {
            debug!(
                "stale signature from {}: ts={} now={}",
                cred.username, timestamp, now
            );
            return Ok(false);
        }
        let Some(user) = self.find_user_by_username(&cred.username).await? else {
            return Ok(false);
        };
        Ok(signature::verify_payload(
            &user.token,
            payload.as_bytes(),
            &cred.signature,
        ))
    }

    /// Whether the principal behind `auth` may push to (or pull from)
    /// `collection`.
    ///
    /// Push requires ownership. Pull is open on public collections and
    /// owner-only on private ones.
    pub async fn has_permission(
        &self,
        auth: &str,
        collection: &Collection,
        requires_push: bool,
    ) -> RegistryResult<bool> {
        let principal = self.resolve_principal(auth).await?;
        self.principal_has_permission(principal.as_ref(), collection, requires_push)
            .await
    }

    pub async fn principal_has_permission(
        &self,
        principal: Option<&User>,
        collection: &Collection,
        requires_push: bool,
    ) -> RegistryResult<bool> {
        if !requires_push && !collection.private {
            return Ok(true);
        }
        match principal {
            Some(user) => self.is_owner(collection.id, user.id).await,
            None => Ok(false),
        }
    }

    /// Owners and superusers may freeze, unfreeze and delete.
    pub async fn has_edit_permission(
        &self,
        user: &User,
        collection: &Collection,
    ) -> RegistryResult<bool> {
        if user.is_superuser {
            return Ok(true);
        }
        self.is_owner(collection.id, user.id).await
    }
}
