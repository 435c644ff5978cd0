use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::RosterApi;
use crate::error::{RosterError, RosterResult};
use crate::models::Profile;

#[derive(Serialize, Deserialize)]
struct SavedSession {
    token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub profile: Profile,
}

pub struct SessionStore {
    path: PathBuf,
    current: Option<Session>,
}

impl SessionStore {
    /// Restores the saved session, if any. A token the server no longer
    /// accepts is discarded rather than retried.
    pub async fn restore(path: impl Into<PathBuf>, api: &dyn RosterApi) -> RosterResult<Self> {
        let mut store = Self {
            path: path.into(),
            current: None,
        };

        let Some(token) = read_token(&store.path).await? else {
            return Ok(store);
        };

        match api.get_profile(&token).await {
            Ok(profile) => {
                info!(user = %profile.username, "restored session");
                store.current = Some(Session { token, profile });
            }
            Err(err) => {
                warn!(error = %err, "saved session rejected; logging out");
                store.logout().await?;
            }
        }
        Ok(store)
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.current.as_ref().map(|session| &session.profile)
    }

    pub fn token(&self) -> RosterResult<&str> {
        self.current
            .as_ref()
            .map(|session| session.token.as_str())
            .ok_or_else(RosterError::not_logged_in)
    }

    /// Nothing changes unless the server accepts the credentials.
    pub async fn login(
        &mut self,
        api: &dyn RosterApi,
        username: &str,
        password: &str,
    ) -> RosterResult<&Profile> {
        let grant = api.login(username, password).await?;
        write_token(&self.path, &grant.token).await?;
        info!(user = %grant.profile.username, "logged in");

        let session = self.current.insert(Session {
            token: grant.token,
            profile: grant.profile,
        });
        Ok(&session.profile)
    }

    /// Client-side only; the server keeps no session state to revoke.
    pub async fn logout(&mut self) -> RosterResult<()> {
        self.current = None;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Re-reads the profile, e.g. after an upload flips an upload flag.
    pub async fn refresh_profile(&mut self, api: &dyn RosterApi) -> RosterResult<()> {
        let token = self.token()?.to_string();
        let profile = match api.get_profile(&token).await {
            Ok(profile) => profile,
            Err(err) => return Err(self.check(err).await),
        };
        if let Some(session) = self.current.as_mut() {
            session.profile = profile;
        }
        Ok(())
    }

    /// Ends the session if `err` says it is no longer valid, then hands the
    /// error back.
    pub async fn check(&mut self, err: RosterError) -> RosterError {
        if err.is_auth() && self.current.is_some() {
            warn!(error = %err, "session rejected by server; logging out");
            if let Err(io) = self.logout().await {
                warn!(error = %io, "could not remove session file");
            }
        }
        err
    }
}

async fn read_token(path: &Path) -> RosterResult<Option<String>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    match serde_json::from_str::<SavedSession>(&raw) {
        Ok(saved) if !saved.token.is_empty() => Ok(Some(saved.token)),
        Ok(_) => Ok(None),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring unreadable session file");
            Ok(None)
        }
    }
}

async fn write_token(path: &Path, token: &str) -> RosterResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let body = serde_json::to_string(&SavedSession {
        token: token.to_string(),
    })?;
    tokio::fs::write(path, body).await?;
    Ok(())
}
