//! CAPTCHA validation handshake
//!
//! `POST DownloadDialog600` with the guess, bound to the session that fetched
//! the challenge and to the detail page as `Referer`. A truthy `result` means
//! the reply itself carries the download parameters.

use serde_json::Value;
use tracing::{debug, info};

use super::AttemptFailure;
use crate::domain::constants::download::{self, form};
use crate::domain::{DownloadParams, ImageDescriptor};
use crate::infrastructure::HttpSession;

const NO_MESSAGE: &str = "(no message)";

#[derive(Debug, Clone, Default)]
pub struct ValidationHandshake;

impl ValidationHandshake {
    pub fn new() -> Self {
        Self
    }

    /// Submit `guess` for `image`; rejections and transport problems are both
    /// [`AttemptFailure`]s but stay distinguishable
    pub async fn validate<S>(
        &self,
        session: &S,
        item_id: &str,
        image: &ImageDescriptor,
        guess: &str,
        referer: &str,
    ) -> Result<DownloadParams, AttemptFailure>
    where
        S: HttpSession + ?Sized,
    {
        let payload = [
            (form::IMAGE_ID, image.id.as_str()),
            (form::DEPARTMENT, download::DEPARTMENT),
            (form::RANDOM_CODE, image.code.as_str()),
            (form::ITEM_ID, item_id),
            (form::CAPTCHA_CODE, guess),
        ];

        debug!("Submitting guess '{}' for image {}", guess, image.name);
        let response = session.post_form(download::VALIDATION_PATH, &payload, referer).await?;

        if !response.is_success() {
            return Err(AttemptFailure::transient(format!(
                "validation returned HTTP {}",
                response.status
            )));
        }

        let reply: Value = serde_json::from_slice(&response.body)
            .map_err(|e| AttemptFailure::transient(format!("malformed validation JSON: {e}")))?;

        if !is_truthy(reply.get("result")) {
            let message = match reply.get("message") {
                Some(Value::String(message)) if !message.is_empty() => message.clone(),
                Some(Value::Null) | None => NO_MESSAGE.to_string(),
                Some(other) => other.to_string(),
            };
            return Err(AttemptFailure::Rejected { message });
        }

        let params: DownloadParams = serde_json::from_value(reply)
            .map_err(|e| AttemptFailure::transient(format!("accepted reply lacks download parameters: {e}")))?;
        info!("✅ CAPTCHA accepted for image {}", image.name);
        Ok(params)
    }
}

/// JSON truthiness: `false`, `null`, `0`, `""`, `[]` and `{}` are falsy
fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::testing::{ScriptedSession, accepted_reply, rejected_reply};
    use crate::infrastructure::RawResponse;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    async fn validate_with(reply: RawResponse) -> Result<DownloadParams, AttemptFailure> {
        let session = ScriptedSession::new(1, Arc::new(Mutex::new(Vec::new()))).with_validation(vec![reply]);
        ValidationHandshake::new()
            .validate(
                &session,
                "2903",
                &ImageDescriptor::new("img1", "1", "AB"),
                "AB12",
                "https://digitalarchive.npm.gov.tw/Painting/Detail/2903",
            )
            .await
    }

    #[tokio::test]
    async fn accepted_reply_carries_download_parameters() {
        let params = validate_with(accepted_reply()).await.unwrap();
        assert_eq!(params.cid, "2903");
        assert_eq!(params.captcha, "AB12");
    }

    #[tokio::test]
    async fn explicit_rejection_keeps_the_server_message() {
        assert_eq!(
            validate_with(rejected_reply("驗證碼錯誤")).await,
            Err(AttemptFailure::Rejected {
                message: "驗證碼錯誤".to_string()
            })
        );
        let bare = RawResponse::ok(br#"{"result": 0}"#.to_vec());
        assert_eq!(
            validate_with(bare).await,
            Err(AttemptFailure::Rejected {
                message: NO_MESSAGE.to_string()
            })
        );
    }

    #[tokio::test]
    async fn server_and_payload_problems_are_transient() {
        let replies = [
            RawResponse::new(500, b"oops".to_vec()),
            RawResponse::ok(b"<html>not json</html>".to_vec()),
            RawResponse::ok(br#"{"result": true, "ImageId": 1, "Dep": "U", "Captcha": "AB12"}"#.to_vec()),
        ];
        for reply in replies {
            let outcome = validate_with(reply.clone()).await;
            assert!(
                matches!(outcome, Err(AttemptFailure::Transient { .. })),
                "{:?} gave {:?}",
                reply.text(),
                outcome
            );
        }
    }

    #[test]
    fn truthiness_follows_json_values() {
        assert!(is_truthy(Some(&json!(true))));
        assert!(is_truthy(Some(&json!(1))));
        assert!(!is_truthy(Some(&json!(false))));
        assert!(!is_truthy(Some(&json!(0))));
        assert!(!is_truthy(Some(&json!(""))));
        assert!(!is_truthy(None));
    }
}
