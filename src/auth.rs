//! Portal login.
//!
//! The login flow is undocumented and has changed before. Everything that knows about it lives
//! here, behind [`Authenticator`], so that the data client never depends on its details.

use std::fmt::{Debug, Formatter};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use http::{HeaderValue, StatusCode};
use serde::Serialize;

use crate::{config::Config, prelude::*};

const LOGIN_PATH: &str = "Authentication/Login";

/// Upper bound of a cookie lifetime, the same one browsers apply.
pub const MAX_COOKIE_LIFETIME: TimeDelta = TimeDelta::days(400);

/// Produces sessions for the data client.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(
        &self,
        http: &reqwest::Client,
        config: &Config,
    ) -> Result<Session, AuthenticationError>;
}

#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    fn is_empty(&self) -> bool {
        self.username.is_empty() || self.password.is_empty()
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Session token along with its validity window.
#[must_use]
#[derive(Clone, Debug)]
pub struct Session {
    /// Ready-to-send `Cookie` header value.
    token: HeaderValue,

    expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(mut token: HeaderValue, expires_at: DateTime<Utc>) -> Self {
        token.set_sensitive(true);
        Self { token, expires_at }
    }

    /// Build the session from the login response cookies.
    ///
    /// The expiry is the earliest one among the cookies, taken from `Max-Age` or else `Expires`,
    /// or `default_lifetime` if none specifies it. Already expired cookies are deletions and get
    /// ignored. Lifetimes are capped at [`MAX_COOKIE_LIFETIME`].
    pub fn from_response(
        response: &reqwest::Response,
        now: DateTime<Utc>,
        default_lifetime: TimeDelta,
    ) -> Result<Self, AuthenticationError> {
        let mut pairs = Vec::new();
        let mut lifetime: Option<TimeDelta> = None;

        for cookie in response.cookies() {
            match cookie_lifetime(&cookie, now) {
                Some(cookie_lifetime) if cookie_lifetime <= TimeDelta::zero() => {
                    debug!(name = cookie.name(), "Skipping a deleted cookie");
                    continue;
                }
                Some(cookie_lifetime) => {
                    lifetime = Some(lifetime.map_or(cookie_lifetime, |it| it.min(cookie_lifetime)));
                }
                None => {}
            }
            pairs.push(format!("{}={}", cookie.name(), cookie.value()));
        }

        if pairs.is_empty() {
            return Err(AuthenticationError::MissingSessionCookie);
        }
        let token = HeaderValue::from_str(&pairs.join("; "))
            .map_err(AuthenticationError::InvalidSessionCookie)?;
        let lifetime = lifetime.unwrap_or(default_lifetime).min(MAX_COOKIE_LIFETIME);
        Ok(Self::new(token, now.checked_add_signed(lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC)))
    }

    #[must_use]
    pub const fn token(&self) -> &HeaderValue {
        &self.token
    }

    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the session can still be used for at least `margin`.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: TimeDelta) -> bool {
        now + margin < self.expires_at
    }
}

fn cookie_lifetime(cookie: &reqwest::cookie::Cookie<'_>, now: DateTime<Utc>) -> Option<TimeDelta> {
    if let Some(max_age) = cookie.max_age() {
        return Some(TimeDelta::from_std(max_age).unwrap_or(MAX_COOKIE_LIFETIME));
    }
    cookie.expires().map(|expires| DateTime::<Utc>::from(expires) - now)
}

/// Username and password login, the one the portal web app performs.
pub struct PasswordLogin {
    credentials: Credentials,
}

impl PasswordLogin {
    pub const fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl Authenticator for PasswordLogin {
    #[instrument(skip_all, fields(username = self.credentials.username()))]
    async fn authenticate(
        &self,
        http: &reqwest::Client,
        config: &Config,
    ) -> Result<Session, AuthenticationError> {
        #[derive(Serialize)]
        struct LoginRequest<'a> {
            #[serde(rename = "user")]
            username: &'a str,

            #[serde(rename = "pwd")]
            password: &'a str,
        }

        if self.credentials.is_empty() {
            return Err(AuthenticationError::EmptyCredentials);
        }

        info!("Logging in…");
        let response = http
            .post(config.url(LOGIN_PATH))
            .json(&LoginRequest {
                username: &self.credentials.username,
                password: &self.credentials.password,
            })
            .send()
            .await
            .map_err(AuthenticationError::Transport)?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AuthenticationError::Rejected);
            }
            status => {
                return Err(AuthenticationError::UnexpectedStatus(status));
            }
        }

        let session = Session::from_response(&response, Utc::now(), config.session_lifetime)?;
        info!(expires_at = %session.expires_at, "Logged in");
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use http::header::SET_COOKIE;
    use mockito::{Matcher, Server};
    use serde_json::json;

    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_694_340_000, 0).unwrap()
    }

    fn response(set_cookies: &[&'static str]) -> reqwest::Response {
        let mut builder = http::Response::builder();
        for set_cookie in set_cookies {
            builder = builder.header(SET_COOKIE, *set_cookie);
        }
        builder.body("").unwrap().into()
    }

    #[test]
    fn test_from_response_ok() -> anyhow::Result<()> {
        let response = response(&[
            "__Host-go4DavidSecurityToken=abc; Path=/; Secure; HttpOnly; Max-Age=900",
            "XSRF-Token=xyz; path=/; max-age=600",
            "Legacy=gone; Max-Age=0",
        ]);
        let session = Session::from_response(&response, now(), TimeDelta::minutes(10))?;
        assert_eq!(session.token(), "__Host-go4DavidSecurityToken=abc; XSRF-Token=xyz");
        assert!(session.token().is_sensitive());
        assert_eq!(session.expires_at(), now() + TimeDelta::seconds(600));
        Ok(())
    }

    #[test]
    fn test_from_response_default_lifetime_ok() -> anyhow::Result<()> {
        let response = response(&["session=abc; Path=/"]);
        let session = Session::from_response(&response, now(), TimeDelta::minutes(10))?;
        assert_eq!(session.token(), "session=abc");
        assert_eq!(session.expires_at(), now() + TimeDelta::minutes(10));
        Ok(())
    }

    #[test]
    fn test_from_response_expires_ok() -> anyhow::Result<()> {
        let response = response(&[
            "session=abc; Path=/; Expires=Sun, 10 Sep 2023 10:05:00 GMT",
            "Legacy=gone; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
        ]);
        let session = Session::from_response(&response, now(), TimeDelta::minutes(10))?;
        assert_eq!(session.token(), "session=abc");
        assert_eq!(session.expires_at(), now() + TimeDelta::minutes(5));
        Ok(())
    }

    #[test]
    fn test_from_response_max_age_takes_precedence_over_expires() -> anyhow::Result<()> {
        let response =
            response(&["session=abc; Max-Age=60; Expires=Sun, 10 Sep 2023 10:05:00 GMT"]);
        let session = Session::from_response(&response, now(), TimeDelta::minutes(10))?;
        assert_eq!(session.expires_at(), now() + TimeDelta::seconds(60));
        Ok(())
    }

    #[test]
    fn test_from_response_huge_max_age_is_capped() -> anyhow::Result<()> {
        for set_cookie in [
            "session=abc; Max-Age=9223372036854775807",
            "session=abc; Max-Age=1000000000000000",
            "session=abc; Max-Age=99999999999999999999999",
        ] {
            let response = response(&[set_cookie]);
            let session = Session::from_response(&response, now(), TimeDelta::minutes(10))?;
            assert_eq!(session.token(), "session=abc");
            assert_eq!(session.expires_at(), now() + MAX_COOKIE_LIFETIME);
        }
        Ok(())
    }

    #[test]
    fn test_from_response_missing() {
        let response = response(&["Legacy=gone; Max-Age=-1"]);
        let result = Session::from_response(&response, now(), TimeDelta::minutes(10));
        assert!(matches!(result, Err(AuthenticationError::MissingSessionCookie)));
    }

    #[test]
    fn test_is_fresh() {
        let session =
            Session::new(HeaderValue::from_static("session=abc"), now() + TimeDelta::seconds(60));
        assert!(session.is_fresh(now(), TimeDelta::seconds(30)));
        assert!(!session.is_fresh(now(), TimeDelta::seconds(60)));
        assert!(!session.is_fresh(now() + TimeDelta::seconds(45), TimeDelta::seconds(30)));
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let credentials = Credentials::new("user", "hunter2");
        let debug = format!("{credentials:?}");
        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_password_login_ok() -> anyhow::Result<()> {
        crate::tests::init_tracing();
        let mut server = Server::new_async().await;
        let login = server
            .mock("POST", "/orchestration/Authentication/Login")
            .match_body(Matcher::Json(json!({"user": "user", "pwd": "secret"})))
            .with_status(200)
            .with_header("set-cookie", "session=abc; Path=/; HttpOnly; Max-Age=900")
            .create_async()
            .await;

        let config = Config::builder().base_url(format!("{}/orchestration", server.url())).build();
        let http = config.build_http_client()?;
        let session = PasswordLogin::new(Credentials::new("user", "secret"))
            .authenticate(&http, &config)
            .await?;

        assert_eq!(session.token(), "session=abc");
        assert!(session.expires_at() > Utc::now() + TimeDelta::seconds(800));
        login.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_password_login_rejected() -> anyhow::Result<()> {
        let mut server = Server::new_async().await;
        let login = server
            .mock("POST", "/orchestration/Authentication/Login")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let config = Config::builder().base_url(format!("{}/orchestration", server.url())).build();
        let result = PasswordLogin::new(Credentials::new("user", "wrong"))
            .authenticate(&config.build_http_client()?, &config)
            .await;

        assert!(matches!(result, Err(AuthenticationError::Rejected)));
        login.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_password_login_without_cookie() -> anyhow::Result<()> {
        let mut server = Server::new_async().await;
        let _login = server
            .mock("POST", "/orchestration/Authentication/Login")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let config = Config::builder().base_url(format!("{}/orchestration", server.url())).build();
        let result = PasswordLogin::new(Credentials::new("user", "secret"))
            .authenticate(&config.build_http_client()?, &config)
            .await;

        assert!(matches!(result, Err(AuthenticationError::MissingSessionCookie)));
        Ok(())
    }

    #[tokio::test]
    async fn test_password_login_unexpected_status() -> anyhow::Result<()> {
        let mut server = Server::new_async().await;
        let _login = server
            .mock("POST", "/orchestration/Authentication/Login")
            .with_status(503)
            .create_async()
            .await;

        let config = Config::builder().base_url(format!("{}/orchestration", server.url())).build();
        let result = PasswordLogin::new(Credentials::new("user", "secret"))
            .authenticate(&config.build_http_client()?, &config)
            .await;

        assert!(matches!(
            result,
            Err(AuthenticationError::UnexpectedStatus(StatusCode::SERVICE_UNAVAILABLE))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_password_login_empty_credentials() -> anyhow::Result<()> {
        let config = Config::builder().base_url("http://127.0.0.1:9/orchestration").build();
        let result = PasswordLogin::new(Credentials::new("user", ""))
            .authenticate(&config.build_http_client()?, &config)
            .await;
        assert!(matches!(result, Err(AuthenticationError::EmptyCredentials)));
        Ok(())
    }
}
