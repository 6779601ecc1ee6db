//! Final image download, `GET Download600` with the validated parameters

use tracing::debug;

use super::AttemptFailure;
use crate::domain::DownloadParams;
use crate::domain::constants::download::{self, query};
use crate::infrastructure::HttpSession;

#[derive(Debug, Clone, Default)]
pub struct ImageFetcher;

impl ImageFetcher {
    pub fn new() -> Self {
        Self
    }

    /// Must run on the session that validated `params`
    pub async fn fetch<S>(&self, session: &S, params: &DownloadParams) -> Result<Vec<u8>, AttemptFailure>
    where
        S: HttpSession + ?Sized,
    {
        let parameters = [
            (query::IMAGE_ID, params.image_id.as_str()),
            (query::DEPARTMENT, params.dep.as_str()),
            (query::CID, params.cid.as_str()),
            (query::CAPTCHA_CODE, params.captcha.as_str()),
            (query::CODE, params.image_code.as_str()),
        ];

        let response = session.get(download::IMAGE_PATH, &parameters).await?;
        if !response.is_success() {
            return Err(AttemptFailure::transient(format!(
                "image download returned HTTP {}",
                response.status
            )));
        }
        if response.body.is_empty() {
            return Err(AttemptFailure::transient("image download returned an empty body"));
        }

        debug!("Downloaded image {} ({} bytes)", params.image_id, response.body.len());
        Ok(response.body)
    }
}
