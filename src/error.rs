use http::StatusCode;
use thiserror::Error;

/// Everything that may go wrong while talking to the smart meter portal.
#[derive(Debug, Error)]
pub enum Error {
    #[error("authentication failed")]
    Authentication(#[from] AuthenticationError),

    #[error("API call failed")]
    Api(#[from] ApiError),

    /// The caller-supplied date string does not match `%d.%m.%Y %H:%M`.
    #[error("invalid date, expected `DD.MM.YYYY HH:MM`")]
    InvalidDate(#[source] chrono::ParseError),
}

#[derive(Debug, Error)]
pub enum AuthenticationError {
    #[error("username and password must not be empty")]
    EmptyCredentials,

    #[error("the credentials were rejected")]
    Rejected,

    #[error("login responded with unexpected status {0}")]
    UnexpectedStatus(StatusCode),

    /// The login succeeded but did not hand out a session, the upstream flow has likely changed.
    #[error("login response did not set any session cookie")]
    MissingSessionCookie,

    #[error("session cookie is not a valid header value")]
    InvalidSessionCookie(#[source] http::header::InvalidHeaderValue),

    #[error("failed to call the login endpoint")]
    Transport(#[source] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("failed to call `{path}`")]
    Transport {
        path: String,

        #[source]
        source: reqwest::Error,
    },

    #[error("`{path}` still rejects the session after re-authentication")]
    Unauthorized { path: String },

    #[error("`{path}` responded with status {status}")]
    Status { path: String, status: StatusCode },

    #[error("failed to deserialize `{path}` response")]
    Deserialize {
        path: String,

        #[source]
        source: serde_json::Error,
    },

    #[error("`{path}` returned an empty list")]
    EmptyResponse { path: String },

    #[error("`{path}` returned {n_timestamps} timestamps for {n_values} values")]
    LengthMismatch { path: String, n_timestamps: usize, n_values: usize },

    #[error("failed to build the HTTP client")]
    Client(#[source] reqwest::Error),
}

impl Error {
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    #[must_use]
    pub const fn is_api(&self) -> bool {
        matches!(self, Self::Api(_))
    }
}
