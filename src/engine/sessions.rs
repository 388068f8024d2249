use dashmap::mapref::entry::Entry;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::checks::{check_password, clean_email, clean_text, new_token};
use super::{Engine, EngineError};

impl Engine {
    /// Create a regular user and log them in.
    pub fn register(
        &self,
        name: &str,
        tel_number: &str,
        email: &str,
        password: &str,
        now: Ms,
    ) -> Result<AuthInfo, EngineError> {
        let user = self.insert_user(name, tel_number, email, password, Role::User)?;
        info!(user_id = %user.id, "registered user");
        let token = self.open_session(user.id, now)?;
        Ok(AuthInfo { user, token })
    }

    /// Create an admin without opening a session. Used at startup.
    pub fn create_admin(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, EngineError> {
        let user = self.insert_user(name, "", email, password, Role::Admin)?;
        info!(user_id = %user.id, "created admin user");
        Ok(user)
    }

    pub(super) fn insert_user(
        &self,
        name: &str,
        tel_number: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, EngineError> {
        if self.users.len() >= MAX_USERS {
            return Err(EngineError::LimitExceeded("too many users"));
        }
        let name = clean_text(name, MAX_NAME_LEN, "name")?;
        let tel_number = tel_number.trim();
        if tel_number.len() > MAX_FIELD_LEN {
            return Err(EngineError::LimitExceeded("tel_number"));
        }
        let email = clean_email(email)?;
        check_password(password)?;

        let id = Ulid::new();
        match self.emails.entry(email.clone()) {
            Entry::Occupied(_) => return Err(EngineError::AlreadyExists(email)),
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }
        let user = User {
            id,
            name,
            tel_number: tel_number.to_string(),
            email,
            role,
            password: password.to_string(),
        };
        self.users.insert(id, user.clone());
        Ok(user)
    }

    /// Same error for an unknown email and a wrong password.
    pub fn login(&self, email: &str, password: &str, now: Ms) -> Result<AuthInfo, EngineError> {
        let email = email.trim().to_lowercase();
        let user_id = self
            .emails
            .get(&email)
            .map(|e| *e.value())
            .ok_or(EngineError::InvalidCredentials)?;
        let user = self
            .users
            .get(&user_id)
            .map(|u| u.value().clone())
            .ok_or(EngineError::InvalidCredentials)?;
        if user.password != password {
            return Err(EngineError::InvalidCredentials);
        }
        let token = self.open_session(user.id, now)?;
        debug!(user_id = %user.id, "login");
        Ok(AuthInfo { user, token })
    }

    fn open_session(&self, user_id: Ulid, now: Ms) -> Result<String, EngineError> {
        if self.sessions.len() >= MAX_SESSIONS {
            return Err(EngineError::LimitExceeded("too many sessions"));
        }
        let token = new_token();
        self.sessions.insert(
            token.clone(),
            Session {
                token: token.clone(),
                user_id,
                expires_at: self.session_expiry(now),
            },
        );
        Ok(token)
    }

    /// Idempotent: logging out an unknown token is not an error.
    pub fn logout(&self, credential: &Credential) {
        if let Some((_, session)) = self.sessions.remove(credential.token()) {
            debug!(user_id = %session.user_id, "logout");
        }
    }

    pub fn me(&self, credential: &Credential, now: Ms) -> Result<User, EngineError> {
        self.authenticate(credential, now)
    }

    pub fn update_me(
        &self,
        credential: &Credential,
        patch: &UserPatch,
        now: Ms,
    ) -> Result<User, EngineError> {
        let current = self.authenticate(credential, now)?;
        if patch.is_empty() {
            return Err(EngineError::NoChanges);
        }
        let name = patch
            .name
            .as_deref()
            .map(|n| clean_text(n, MAX_NAME_LEN, "name"))
            .transpose()?;
        let tel_number = match patch.tel_number.as_deref().map(str::trim) {
            Some(t) if t.len() > MAX_FIELD_LEN => {
                return Err(EngineError::LimitExceeded("tel_number"));
            }
            other => other.map(str::to_string),
        };
        let email = patch.email.as_deref().map(clean_email).transpose()?;

        // Claim the new address before releasing the old one.
        if let Some(ref new_email) = email
            && *new_email != current.email
        {
            match self.emails.entry(new_email.clone()) {
                Entry::Occupied(_) => return Err(EngineError::AlreadyExists(new_email.clone())),
                Entry::Vacant(slot) => {
                    slot.insert(current.id);
                }
            }
            self.emails.remove(&current.email);
        }

        let mut user = self
            .users
            .get_mut(&current.id)
            .ok_or(EngineError::Unauthenticated)?;
        if let Some(name) = name {
            user.name = name;
        }
        if let Some(tel_number) = tel_number {
            user.tel_number = tel_number;
        }
        if let Some(email) = email {
            user.email = email;
        }
        Ok(user.clone())
    }

    pub fn list_users(&self, credential: &Credential, now: Ms) -> Result<Vec<User>, EngineError> {
        self.authenticate_admin(credential, now)?;
        let mut users: Vec<User> = self.users.iter().map(|u| u.value().clone()).collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    /// Tokens of sessions that expired at or before `now`.
    pub fn collect_expired_sessions(&self, now: Ms) -> Vec<String> {
        self.sessions
            .iter()
            .filter(|s| s.expires_at <= now)
            .map(|s| s.key().clone())
            .collect()
    }

    /// Drop one session if it is still expired. Returns whether it was removed.
    pub fn expire_session(&self, token: &str, now: Ms) -> bool {
        self.sessions
            .remove_if(token, |_, s| s.expires_at <= now)
            .is_some()
    }
}
