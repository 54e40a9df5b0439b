//! Persisted login session and the credential it drives.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::api::{ApiError, Credential, LoginResponse, SignupResponse};
use crate::config::data_dir;
use crate::model::UserSummary;

/// Shape of `session.json`: the token and the cached user, under fixed keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    #[serde(default)]
    pub user: Option<UserSummary>,
}

/// On-disk storage for the session file
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The default location: <data_dir>/session.json
    pub fn default_location() -> Self {
        Self::new(data_dir().join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<StoredSession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    pub fn save(&self, session: &StoredSession) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let data = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, data)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

pub struct Session {
    store: SessionStore,
    credential: Credential,
    current: Option<StoredSession>,
    /// Set by the first 401 of an expiry episode, cleared by the next login
    expiring: bool,
}

impl Session {
    pub fn new(store: SessionStore, credential: Credential) -> Self {
        Self {
            store,
            credential,
            current: None,
            expiring: false,
        }
    }

    /// Read the persisted session and attach its token. Returns whether a
    /// session was found.
    pub fn restore(&mut self) -> bool {
        match self.store.load() {
            Ok(Some(saved)) => {
                info!("Restored session from {}", self.store.path().display());
                self.credential.attach(&saved.token);
                self.current = Some(saved);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Ignoring unreadable session file: {}", e);
                false
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.is_some()
    }

    pub fn user(&self) -> Option<&UserSummary> {
        self.current.as_ref().and_then(|s| s.user.as_ref())
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user().map(|u| u.id.as_str())
    }

    pub fn is_expiring(&self) -> bool {
        self.expiring
    }

    /// Persist a fresh login and attach its token
    pub fn establish(&mut self, token: &str, user: UserSummary) -> Result<()> {
        let saved = StoredSession {
            token: token.to_string(),
            user: Some(user),
        };
        self.credential.attach(token);
        self.current = Some(saved.clone());
        self.expiring = false;
        self.store.save(&saved)
    }

    /// Replace the cached user wholesale (after `GET /api/user/me`)
    pub fn set_user(&mut self, user: UserSummary) -> Result<()> {
        let Some(current) = self.current.as_mut() else {
            return Ok(());
        };
        current.user = Some(user);
        self.store.save(current)
    }

    pub fn logout(&mut self) -> Result<()> {
        info!("Logging out");
        self.forget()
    }

    /// Handle a 401. Only the first call of an episode clears state; it
    /// returns true so the caller can show the notice and schedule the
    /// redirect.
    pub fn on_unauthorized(&mut self) -> bool {
        if self.expiring {
            return false;
        }
        self.expiring = true;
        warn!("Session expired");
        if let Err(e) = self.forget() {
            warn!("Failed to clear session file: {}", e);
        }
        true
    }

    fn forget(&mut self) -> Result<()> {
        self.credential.detach();
        self.current = None;
        self.store.clear()
    }
}

/// Reduce a login response to `(token, user)` or the message to show on the
/// form.
pub fn interpret_login(result: Result<LoginResponse, ApiError>) -> Result<(String, UserSummary), String> {
    match result {
        Ok(LoginResponse {
            success: true,
            token: Some(token),
            user: Some(user),
            ..
        }) => Ok((token, user)),
        Ok(resp) => Err(resp
            .message
            .unwrap_or_else(|| "Invalid credentials".to_string())),
        Err(e) => Err(e
            .server_message()
            .map(str::to_string)
            .unwrap_or_else(|| "Something went wrong, try again".to_string())),
    }
}

/// Same reduction for signup: `Ok` carries the notice text
pub fn interpret_signup(result: Result<SignupResponse, ApiError>) -> Result<String, String> {
    match result {
        Ok(resp) if resp.success => Ok(resp
            .message
            .unwrap_or_else(|| "Account created, please login".to_string())),
        Ok(resp) => Err(resp.message.unwrap_or_else(|| "Signup failed".to_string())),
        Err(e) => Err(e
            .server_message()
            .map(str::to_string)
            .unwrap_or_else(|| "Something went wrong, try again".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserSummary {
        UserSummary {
            id: id.to_string(),
            firstname: "Ada".into(),
            lastname: "Lovelace".into(),
            email: "a@b.com".into(),
            avatar_url: None,
        }
    }

    fn session_in(dir: &tempfile::TempDir) -> (Session, SessionStore, Credential) {
        let store = SessionStore::new(dir.path().join("session.json"));
        let cred = Credential::default();
        (Session::new(store.clone(), cred.clone()), store, cred)
    }

    #[test]
    fn establish_persists_token_and_user() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, store, cred) = session_in(&dir);
        session.establish("T", user("u1")).unwrap();

        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.token, "T");
        assert_eq!(saved.user.unwrap().id, "u1");
        assert_eq!(cred.get().as_deref(), Some("T"));
    }

    #[test]
    fn restore_attaches_persisted_token() {
        let dir = tempfile::tempdir().unwrap();
        let (_, store, _) = session_in(&dir);
        store
            .save(&StoredSession {
                token: "T".into(),
                user: None,
            })
            .unwrap();

        let (mut session, _, cred) = session_in(&dir);
        assert!(session.restore());
        assert!(session.is_authenticated());
        assert!(session.user().is_none());
        assert_eq!(cred.get().as_deref(), Some("T"));
    }

    #[test]
    fn restore_without_file_stays_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _, cred) = session_in(&dir);
        assert!(!session.restore());
        assert!(!cred.is_attached());
    }

    #[test]
    fn unauthorized_clears_once_per_episode() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, store, cred) = session_in(&dir);
        session.establish("T", user("u1")).unwrap();

        assert!(session.on_unauthorized());
        assert!(!session.on_unauthorized());
        assert!(store.load().unwrap().is_none());
        assert!(!cred.is_attached());
        assert!(!session.is_authenticated());

        session.establish("T2", user("u1")).unwrap();
        assert!(!session.is_expiring());
        assert!(session.on_unauthorized());
    }

    #[test]
    fn logout_removes_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, store, cred) = session_in(&dir);
        session.establish("T", user("u1")).unwrap();
        session.logout().unwrap();
        assert!(!store.path().exists());
        assert!(!cred.is_attached());
    }

    #[test]
    fn login_success_yields_token_and_user() {
        let resp = LoginResponse {
            success: true,
            token: Some("T".into()),
            user: Some(user("u1")),
            message: None,
        };
        let (token, u) = interpret_login(Ok(resp)).unwrap();
        assert_eq!(token, "T");
        assert_eq!(u.id, "u1");
    }

    #[test]
    fn login_failure_messages() {
        let rejected = LoginResponse {
            success: false,
            ..Default::default()
        };
        assert_eq!(interpret_login(Ok(rejected)).unwrap_err(), "Invalid credentials");

        let server = ApiError::Status {
            status: 400,
            message: Some("Wrong password".into()),
        };
        assert_eq!(interpret_login(Err(server)).unwrap_err(), "Wrong password");

        let bare = ApiError::Status {
            status: 500,
            message: None,
        };
        assert_eq!(
            interpret_login(Err(bare)).unwrap_err(),
            "Something went wrong, try again"
        );
    }

    #[test]
    fn signup_outcomes() {
        let ok = SignupResponse {
            success: true,
            message: None,
        };
        assert_eq!(interpret_signup(Ok(ok)).unwrap(), "Account created, please login");
        let taken = ApiError::Status {
            status: 409,
            message: Some("Email already registered".into()),
        };
        assert_eq!(
            interpret_signup(Err(taken)).unwrap_err(),
            "Email already registered"
        );
    }
}
