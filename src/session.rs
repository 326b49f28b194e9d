//! Session state.
//!
//! `Session` tracks the signed-in identity and publishes every change on a
//! `tokio::sync::watch` channel. Credential checks are delegated to a
//! `SessionProvider`; `MemoryAuth` is the in-process provider used by the
//! server and the tests.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::types::{BookError, BookResult, Identity};

/// Abstraction over the hosted authentication service.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
        display_name: &str,
    ) -> BookResult<Identity>;

    async fn sign_in(&self, email: &str, password: &SecretString) -> BookResult<Identity>;

    async fn sign_out(&self, uid: &str) -> BookResult<()>;

    async fn send_password_reset(&self, email: &str) -> BookResult<()>;

    async fn update_display_name(&self, uid: &str, display_name: &str) -> BookResult<Identity>;
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session {
    provider: Arc<dyn SessionProvider>,
    current: watch::Sender<Option<Identity>>,
}

impl Session {
    pub fn new(provider: Arc<dyn SessionProvider>) -> Self {
        let (current, _) = watch::channel(None);
        Self { provider, current }
    }

    /// The signed-in identity, if any.
    pub fn current(&self) -> Option<Identity> {
        self.current.borrow().clone()
    }

    /// The signed-in identity, or `NotAuthenticated`.
    pub fn require(&self) -> BookResult<Identity> {
        self.current().ok_or(BookError::NotAuthenticated)
    }

    /// Receive the current identity now and on every later change.
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
        display_name: &str,
    ) -> BookResult<Identity> {
        let identity = self.provider.sign_up(email, password, display_name).await?;
        info!(uid = %identity.uid, email = %identity.email, "Signed up");
        self.current.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    pub async fn sign_in(&self, email: &str, password: &SecretString) -> BookResult<Identity> {
        let identity = self.provider.sign_in(email, password).await.map_err(|e| {
            warn!(email, error = %e, "Sign-in failed");
            e
        })?;
        info!(uid = %identity.uid, "Signed in");
        self.current.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    /// Sign out. A session with no identity is left as is.
    pub async fn sign_out(&self) -> BookResult<()> {
        if let Some(identity) = self.current() {
            self.provider.sign_out(&identity.uid).await?;
            info!(uid = %identity.uid, "Signed out");
        }
        self.current.send_replace(None);
        Ok(())
    }

    pub async fn send_password_reset(&self, email: &str) -> BookResult<()> {
        self.provider.send_password_reset(email).await
    }

    pub async fn update_display_name(&self, display_name: &str) -> BookResult<Identity> {
        let identity = self.require()?;
        let updated = self
            .provider
            .update_display_name(&identity.uid, display_name)
            .await?;
        self.current.send_replace(Some(updated.clone()));
        Ok(updated)
    }
}

// ---------------------------------------------------------------------------
// In-memory provider
// ---------------------------------------------------------------------------

struct Account {
    uid: String,
    email: String,
    display_name: Option<String>,
    /// Hex SHA-256 of uid || password.
    password_digest: String,
}

impl Account {
    fn identity(&self) -> Identity {
        Identity {
            uid: self.uid.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// Email/password accounts held in process memory.
#[derive(Default)]
pub struct MemoryAuth {
    accounts: RwLock<HashMap<String, Account>>,
    reset_requests: RwLock<Vec<String>>,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emails for which a password reset was requested, oldest first.
    pub async fn reset_requests(&self) -> Vec<String> {
        self.reset_requests.read().await.clone()
    }

    fn normalize(email: &str) -> String {
        email.trim().to_lowercase()
    }

    fn digest(salt: &str, password: &SecretString) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(password.expose_secret().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[async_trait]
impl SessionProvider for MemoryAuth {
    async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
        display_name: &str,
    ) -> BookResult<Identity> {
        let key = Self::normalize(email);
        if !key.contains('@') || password.expose_secret().is_empty() {
            return Err(BookError::InvalidCredentials);
        }

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&key) {
            return Err(BookError::EmailInUse(key));
        }

        let uid = Uuid::new_v4().to_string();
        let account = Account {
            password_digest: Self::digest(&uid, password),
            uid,
            email: key.clone(),
            display_name: Some(display_name.trim().to_string()).filter(|n| !n.is_empty()),
        };
        let identity = account.identity();
        accounts.insert(key, account);
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &SecretString) -> BookResult<Identity> {
        let accounts = self.accounts.read().await;
        let account = accounts
            .get(&Self::normalize(email))
            .ok_or(BookError::InvalidCredentials)?;
        if Self::digest(&account.uid, password) != account.password_digest {
            return Err(BookError::InvalidCredentials);
        }
        Ok(account.identity())
    }

    async fn sign_out(&self, _uid: &str) -> BookResult<()> {
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> BookResult<()> {
        let key = Self::normalize(email);
        if !self.accounts.read().await.contains_key(&key) {
            return Err(BookError::NotFound(format!("account {key}")));
        }
        info!(email = %key, "Password reset requested");
        self.reset_requests.write().await.push(key);
        Ok(())
    }

    async fn update_display_name(&self, uid: &str, display_name: &str) -> BookResult<Identity> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .values_mut()
            .find(|a| a.uid == uid)
            .ok_or_else(|| BookError::NotFound(format!("account {uid}")))?;
        account.display_name = Some(display_name.trim().to_string());
        Ok(account.identity())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::new(s.to_string())
    }

    fn session() -> (Session, Arc<MemoryAuth>) {
        let auth = Arc::new(MemoryAuth::new());
        (Session::new(auth.clone()), auth)
    }

    #[tokio::test]
    async fn test_sign_up_sets_identity() {
        let (s, _) = session();
        let id = s.sign_up("Ann@Example.com", &secret("hunter22"), "Ann").await.unwrap();
        assert_eq!(id.email, "ann@example.com");
        assert_eq!(id.display_name.as_deref(), Some("Ann"));
        assert_eq!(s.current(), Some(id));
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let (s, _) = session();
        s.sign_up("a@b.c", &secret("pw1234"), "A").await.unwrap();
        let err = s.sign_up("A@B.C", &secret("other"), "B").await.unwrap_err();
        assert!(matches!(err, BookError::EmailInUse(_)));
    }

    #[tokio::test]
    async fn test_sign_in_checks_password() {
        let (s, _) = session();
        s.sign_up("a@b.c", &secret("right"), "A").await.unwrap();
        s.sign_out().await.unwrap();
        assert!(s.current().is_none());

        let err = s.sign_in("a@b.c", &secret("wrong")).await.unwrap_err();
        assert_eq!(err, BookError::InvalidCredentials);
        assert!(s.current().is_none());

        let id = s.sign_in("a@b.c", &secret("right")).await.unwrap();
        assert_eq!(s.current().map(|i| i.uid), Some(id.uid));
    }

    #[tokio::test]
    async fn test_subscription_sees_changes() {
        let (s, _) = session();
        let mut rx = s.subscribe();
        assert!(rx.borrow().is_none());

        s.sign_up("a@b.c", &secret("pw"), "A").await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_some());

        s.sign_out().await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }

    #[tokio::test]
    async fn test_update_display_name_requires_session() {
        let (s, _) = session();
        assert_eq!(
            s.update_display_name("X").await.unwrap_err(),
            BookError::NotAuthenticated
        );
        s.sign_up("a@b.c", &secret("pw"), "A").await.unwrap();
        let id = s.update_display_name("Zed").await.unwrap();
        assert_eq!(id.display_name.as_deref(), Some("Zed"));
        assert_eq!(s.current().unwrap().display_name.as_deref(), Some("Zed"));
    }

    #[test]
    fn test_password_reset_recorded() {
        tokio_test::block_on(async {
            let (s, auth) = session();
            s.sign_up("a@b.c", &secret("pw"), "A").await.unwrap();
            s.send_password_reset(" A@b.c ").await.unwrap();
            assert_eq!(auth.reset_requests().await, vec!["a@b.c".to_string()]);
            assert!(matches!(
                s.send_password_reset("nobody@b.c").await,
                Err(BookError::NotFound(_))
            ));
        });
    }

    #[test]
    fn test_digest_is_salted() {
        let pw = secret("same");
        assert_ne!(MemoryAuth::digest("uid-1", &pw), MemoryAuth::digest("uid-2", &pw));
        assert_eq!(MemoryAuth::digest("uid-1", &pw).len(), 64);
    }
}
