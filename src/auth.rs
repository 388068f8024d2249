use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;
use tracing::debug;

/// Server password checked during the cleartext startup handshake.
///
/// This gates the connection only. Guests and admins identify themselves
/// afterwards with a session token (see `wire::TOKEN_KEY`).
#[derive(Debug)]
pub struct StayAuthSource {
    password: String,
}

impl StayAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for StayAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        debug!(user = ?login.user(), "startup auth");
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}
