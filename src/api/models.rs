use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Account of the business partner, as returned by `User/GetAccountIdByBussinespartnerId`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AccountDetails {
    #[serde(rename = "accountId")]
    pub account_id: String,

    #[serde(rename = "hasSmartMeter", default)]
    pub has_smart_meter: bool,

    #[serde(rename = "hasElectricity", default)]
    pub has_electricity: bool,

    #[serde(rename = "hasCommunicative", default)]
    pub has_communicative: bool,

    #[serde(rename = "hasActive", default)]
    pub has_active: bool,

    /// Everything else the portal returns.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AccountDetails {
    /// Whether the account has an active, communicating electricity smart meter,
    /// which is what the consumption endpoints need.
    #[must_use]
    pub const fn supports_api(&self) -> bool {
        self.has_smart_meter && self.has_electricity && self.has_communicative && self.has_active
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MeterDetails {
    #[serde(rename = "meteringPointId")]
    pub metering_point_id: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Basic user profile, kept as is.
#[derive(Clone, Debug, Deserialize, Serialize, derive_more::Deref, derive_more::IntoIterator)]
#[serde(transparent)]
pub struct UserDetails(pub Map<String, Value>);
