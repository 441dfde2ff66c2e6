#![allow(clippy::doc_markdown, clippy::missing_errors_doc)]
#![doc = include_str!("../README.md")]

mod api;
mod auth;
mod config;
mod consumption;
mod error;
mod prelude;
mod quantity;

pub use crate::{
    api::{AccountDetails, Client, MeterDetails, UserDetails},
    auth::{Authenticator, Credentials, MAX_COOKIE_LIFETIME, PasswordLogin, Session},
    config::{Config, DEFAULT_BASE_URL},
    consumption::{ConsumptionRecord, MeterReading, Resolution, SINCE_DATE_FORMAT, Sample},
    error::{ApiError, AuthenticationError, Error},
    prelude::Result,
    quantity::energy::KilowattHours,
};

#[cfg(test)]
mod tests {
    use tracing::Level;

    /// Route the client logs into the test output.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .without_time()
            .compact()
            .with_test_writer()
            .try_init();
    }
}
