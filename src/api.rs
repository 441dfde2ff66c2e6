mod models;
mod response;

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use http::{StatusCode, header::COOKIE};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::{OnceCell, RwLock};

pub use self::models::{AccountDetails, MeterDetails, UserDetails};
use self::response::Response;
use crate::{
    auth::{Authenticator, Credentials, PasswordLogin, Session},
    config::Config,
    consumption::{
        ConsumptionData,
        ConsumptionRecord,
        MeterReading,
        Resolution,
        RunningTotal,
        Sample,
        parse_since_date,
    },
    prelude::*,
    quantity::energy::KilowattHours,
};

const USER_DETAILS_PATH: &str = "User/GetBasicInfo";
const ACCOUNTING_DETAILS_PATH: &str = "User/GetAccountIdByBussinespartnerId";
const METER_DETAILS_PATH: &str = "User/GetMeteringPointByAccountId";
const DAY_CONSUMPTION_PATH: &str = "ConsumptionRecord/Day";
const MONTH_CONSUMPTION_PATH: &str = "ConsumptionRecord/Month";
const YEAR_CONSUMPTION_PATH: &str = "ConsumptionRecord/Year";

/// Smart meter portal client.
///
/// Logs in lazily, renews the session when it is about to expire,
/// and re-authenticates once when the portal rejects it.
pub struct Client {
    http: reqwest::Client,
    config: Config,
    authenticator: Box<dyn Authenticator>,

    /// Concurrent calls may race to renew it, each one then logs in on its own.
    session: RwLock<Option<Session>>,

    account_id: OnceCell<String>,
    metering_point_id: OnceCell<String>,
}

impl Client {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        Self::with_config(Credentials::new(username, password), Config::default())
    }

    pub fn with_config(credentials: Credentials, config: Config) -> Result<Self> {
        Self::with_authenticator(PasswordLogin::new(credentials), config)
    }

    pub fn with_authenticator(
        authenticator: impl Authenticator + 'static,
        config: Config,
    ) -> Result<Self> {
        let http = config.build_http_client().map_err(ApiError::Client)?;
        Ok(Self {
            http,
            config,
            authenticator: Box::new(authenticator),
            session: RwLock::new(None),
            account_id: OnceCell::new(),
            metering_point_id: OnceCell::new(),
        })
    }

    /// Log in right away, replacing the current session.
    ///
    /// Useful to validate the credentials upfront.
    pub async fn authenticate(&self) -> Result {
        self.login().await.map(drop)
    }

    /// Forget the current session, the next call logs in again.
    pub async fn invalidate_session(&self) {
        *self.session.write().await = None;
    }

    #[instrument(skip_all)]
    pub async fn get_user_details(&self) -> Result<UserDetails> {
        info!("Fetching…");
        self.get_first(USER_DETAILS_PATH, &[("context", "2")]).await
    }

    #[instrument(skip_all)]
    pub async fn get_accounting_details(&self) -> Result<AccountDetails> {
        info!("Fetching…");
        let details: AccountDetails =
            self.get_first(ACCOUNTING_DETAILS_PATH, &[("context", "2")]).await?;
        info!(account_id = details.account_id, supports_api = details.supports_api(), "Fetched");
        Ok(details)
    }

    #[instrument(skip_all)]
    pub async fn get_meter_details(&self) -> Result<MeterDetails> {
        let account_id = self.account_id().await?;
        info!(account_id, "Fetching…");
        let details: MeterDetails = self
            .get_first(METER_DETAILS_PATH, &[("context", "2"), ("accountId", account_id)])
            .await?;
        info!(metering_point_id = details.metering_point_id, "Fetched");
        Ok(details)
    }

    /// Quarter-hour consumption on the specified day.
    #[instrument(skip_all, fields(day = %day))]
    pub async fn get_consumption_per_day(&self, day: NaiveDate) -> Result<Vec<Sample>> {
        #[derive(Serialize)]
        struct DayQuery<'a> {
            #[serde(rename = "meterId")]
            meter_id: &'a str,

            day: NaiveDate,
        }

        let meter_id = self.metering_point_id().await?;
        info!("Fetching…");
        let samples = self
            .get_first::<_, ConsumptionData>(DAY_CONSUMPTION_PATH, &DayQuery { meter_id, day })
            .await?
            .into_quarter_hours(DAY_CONSUMPTION_PATH)?;
        info!(n_samples = samples.len(), "Fetched");
        Ok(samples)
    }

    /// Daily consumption within the specified month.
    #[instrument(skip_all, fields(year = year, month = month))]
    pub async fn get_consumption_for_month(&self, year: i32, month: u32) -> Result<Vec<Sample>> {
        #[derive(Serialize)]
        struct MonthQuery<'a> {
            #[serde(rename = "meterId")]
            meter_id: &'a str,

            year: i32,
            month: u32,
        }

        let meter_id = self.metering_point_id().await?;
        info!("Fetching…");
        let samples = self
            .get_first::<_, ConsumptionData>(
                MONTH_CONSUMPTION_PATH,
                &MonthQuery { meter_id, year, month },
            )
            .await?
            .into_days(year, month);
        info!(n_samples = samples.len(), "Fetched");
        Ok(samples)
    }

    /// Monthly consumption within the specified year.
    #[instrument(skip_all, fields(year = year))]
    pub async fn get_consumption_for_year(&self, year: i32) -> Result<Vec<Sample>> {
        #[derive(Serialize)]
        struct YearQuery<'a> {
            #[serde(rename = "meterId")]
            meter_id: &'a str,

            year: i32,
        }

        let meter_id = self.metering_point_id().await?;
        info!("Fetching…");
        let samples = self
            .get_first::<_, ConsumptionData>(YEAR_CONSUMPTION_PATH, &YearQuery { meter_id, year })
            .await?
            .into_months(year);
        info!(n_samples = samples.len(), "Fetched");
        Ok(samples)
    }

    /// Consumption records since `date` (`DD.MM.YYYY HH:MM`, local time) until now.
    ///
    /// The record totals start from `offset`, so that they line up with the meter reading
    /// when `offset` is the reading at `date`.
    pub async fn get_consumption_since_date(
        &self,
        date: &str,
        offset: impl Into<KilowattHours>,
    ) -> Result<Vec<ConsumptionRecord>> {
        self.get_consumption_since(parse_since_date(date)?, offset).await
    }

    pub async fn get_consumption_since(
        &self,
        since: NaiveDateTime,
        offset: impl Into<KilowattHours>,
    ) -> Result<Vec<ConsumptionRecord>> {
        self.consumption_since(since, Local::now().date_naive(), offset.into()).await
    }

    /// Meter reading as of today's midnight: `offset` plus everything consumed since `date`.
    ///
    /// The portal receives the meter data once a day, hence the midnight.
    pub async fn get_meter_reading_since_date(
        &self,
        date: &str,
        offset: impl Into<KilowattHours>,
    ) -> Result<MeterReading> {
        let since = parse_since_date(date)?;
        self.meter_reading_since(since, Local::now().date_naive(), offset.into()).await
    }

    #[instrument(skip_all, fields(since = %since, today = %today))]
    async fn consumption_since(
        &self,
        since: NaiveDateTime,
        today: NaiveDate,
        offset: KilowattHours,
    ) -> Result<Vec<ConsumptionRecord>> {
        if since.date() >= today {
            info!("Nothing to fetch yet");
            return Ok(vec![ConsumptionRecord::anchor(since, offset)]);
        }

        let mut running_total = RunningTotal::new(offset);

        // Rest of the starting day:
        running_total.extend(
            Resolution::QuarterHour,
            self.get_consumption_per_day(since.date())
                .await?
                .into_iter()
                .filter(|sample| sample.start > since),
        );

        // Rest of the starting month:
        running_total.extend(
            Resolution::Day,
            self.get_consumption_for_month(since.year(), since.month())
                .await?
                .into_iter()
                .filter(|sample| sample.start.date() > since.date()),
        );

        // Rest of the starting year:
        let last_month = if since.year() == today.year() { today.month() } else { 12 };
        running_total.extend(
            Resolution::Month,
            self.get_consumption_for_year(since.year())
                .await?
                .into_iter()
                .filter(|sample| (since.month() + 1..=last_month).contains(&sample.start.month())),
        );

        // Following years:
        for year in since.year() + 1..=today.year() {
            running_total.extend(
                Resolution::Month,
                self.get_consumption_for_year(year)
                    .await?
                    .into_iter()
                    .filter(|sample| sample.start.date() <= today),
            );
        }

        info!(total = %running_total.total(), "Summed up");
        Ok(running_total.into_records())
    }

    async fn meter_reading_since(
        &self,
        since: NaiveDateTime,
        today: NaiveDate,
        offset: KilowattHours,
    ) -> Result<MeterReading> {
        if since.date() >= today {
            return Ok(MeterReading { timestamp: since, total: offset });
        }
        let records = self.consumption_since(since, today, offset).await?;
        Ok(MeterReading {
            timestamp: today.and_time(NaiveTime::MIN),
            total: records.last().map_or(offset, |record| record.total),
        })
    }

    async fn account_id(&self) -> Result<&str> {
        self.account_id
            .get_or_try_init(|| async {
                Ok::<_, Error>(self.get_accounting_details().await?.account_id)
            })
            .await
            .map(String::as_str)
    }

    async fn metering_point_id(&self) -> Result<&str> {
        self.metering_point_id
            .get_or_try_init(|| async {
                Ok::<_, Error>(self.get_meter_details().await?.metering_point_id)
            })
            .await
            .map(String::as_str)
    }

    /// Current session, logging in when there is none or it is about to expire.
    async fn session(&self) -> Result<Session> {
        let session = self
            .session
            .read()
            .await
            .as_ref()
            .filter(|session| session.is_fresh(Utc::now(), self.config.expiry_margin))
            .cloned();
        match session {
            Some(session) => Ok(session),
            None => self.login().await,
        }
    }

    async fn login(&self) -> Result<Session> {
        let session = self.authenticator.authenticate(&self.http, &self.config).await?;
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    async fn get_first<Q, R>(&self, path: &str, query: &Q) -> Result<R>
    where
        Q: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        Ok(self.get::<Q, Response<R>>(path, query).await?.into_first(path)?)
    }

    #[instrument(skip_all, level = Level::DEBUG, fields(path = path))]
    async fn get<Q, R>(&self, path: &str, query: &Q) -> Result<R>
    where
        Q: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut response = self.send(path, query, &self.session().await?).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Session rejected, re-authenticating…");
            response = self.send(path, query, &self.login().await?).await?;
            if response.status() == StatusCode::UNAUTHORIZED {
                return Err(ApiError::Unauthorized { path: path.to_owned() }.into());
            }
        }

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status { path: path.to_owned(), status }.into());
        }
        let body = response
            .text()
            .await
            .map_err(|source| ApiError::Transport { path: path.to_owned(), source })?;
        debug!(body, "Call succeeded");
        Ok(serde_json::from_str(&body)
            .map_err(|source| ApiError::Deserialize { path: path.to_owned(), source })?)
    }

    async fn send<Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
        session: &Session,
    ) -> Result<reqwest::Response, ApiError> {
        self.http
            .get(self.config.url(path))
            .header(COOKIE, session.token().clone())
            .query(query)
            .send()
            .await
            .map_err(|source| ApiError::Transport { path: path.to_owned(), source })
    }
}
