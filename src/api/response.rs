use serde::Deserialize;

use crate::prelude::*;

/// Generic API response.
///
/// The portal wraps every object into a single-element array.
#[derive(Deserialize)]
#[serde(transparent)]
pub struct Response<R>(Vec<R>);

impl<R> Response<R> {
    pub fn into_first(self, path: &str) -> Result<R, ApiError> {
        self.0.into_iter().next().ok_or_else(|| ApiError::EmptyResponse { path: path.to_owned() })
    }
}
