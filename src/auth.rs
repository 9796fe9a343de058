use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;

/// Cleartext password check. Every venue shares the one server password;
/// the user name is ignored.
#[derive(Debug)]
pub struct VenueAuthSource {
    password: String,
}

impl VenueAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for VenueAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        tracing::debug!(user = ?login.user(), database = ?login.database(), "password requested");
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}
