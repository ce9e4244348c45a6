use std::time::Duration;

use axum::http::StatusCode;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use crate::{error::ApiRequestError, target::Target};

type HmacSha256 = Hmac<Sha256>;

/// The hidden fields a comment form carries so the target and parent of a
/// submission can't be swapped after the form was rendered.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SecurityData {
    pub content_type: String,
    pub object_pk: String,
    pub timestamp: i64,
    pub security_hash: String,
}

/// Security fields as they come back from a submission.
#[derive(Debug, Default, Clone)]
pub struct SubmittedSecurity<'a> {
    pub content_type: Option<&'a str>,
    pub object_pk: Option<&'a str>,
    pub timestamp: Option<&'a str>,
    pub security_hash: Option<&'a str>,
    pub honeypot: Option<&'a str>,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TokenError {
    #[error("Security data is missing `{0}`")]
    Missing(&'static str),

    #[error("The submitted target does not match the commented object")]
    TargetMismatch,

    #[error("The comment form has expired, please reload the page")]
    Expired,

    #[error("The comment form timestamp is invalid")]
    BadTimestamp,

    #[error("The security hash failed to verify")]
    BadHash,

    #[error("The honeypot field must be left empty")]
    Honeypot,
}

impl ApiRequestError for TokenError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}

pub struct TokenSigner {
    key: Vec<u8>,
    max_age: Duration,
}

impl TokenSigner {
    pub fn new(key: impl Into<Vec<u8>>, max_age: Duration) -> Self {
        TokenSigner {
            key: key.into(),
            max_age,
        }
    }

    fn mac(
        &self,
        content_type: &str,
        object_pk: &str,
        parent: Option<i32>,
        timestamp: i64,
    ) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key).ok()?;
        let parent = parent.map(|p| p.to_string()).unwrap_or_default();
        mac.update(format!("{content_type}\n{object_pk}\n{parent}\n{timestamp}").as_bytes());
        Some(mac)
    }

    /// Signs the hidden form fields. The hash is left empty if HMAC refuses
    /// the key.
    pub fn generate(&self, target: &Target, parent: Option<i32>, now: i64) -> SecurityData {
        let content_type = target.content_type.to_string();
        let object_pk = target.object_id.to_string();
        let security_hash = match self.mac(&content_type, &object_pk, parent, now) {
            Some(mac) => URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()),
            None => {
                tracing::error!("couldn't key the form signer");
                String::new()
            }
        };

        SecurityData {
            content_type,
            object_pk,
            timestamp: now,
            security_hash,
        }
    }

    /// Checks a submission against the target it was posted to.
    pub fn verify(
        &self,
        target: &Target,
        parent: Option<i32>,
        submitted: &SubmittedSecurity<'_>,
        now: i64,
    ) -> Result<(), TokenError> {
        if submitted.honeypot.is_some_and(|h| !h.is_empty()) {
            return Err(TokenError::Honeypot);
        }

        let content_type = submitted
            .content_type
            .ok_or(TokenError::Missing("content_type"))?;
        let object_pk = submitted.object_pk.ok_or(TokenError::Missing("object_pk"))?;
        let timestamp = submitted.timestamp.ok_or(TokenError::Missing("timestamp"))?;
        let security_hash = submitted
            .security_hash
            .ok_or(TokenError::Missing("security_hash"))?;

        if content_type != target.content_type.to_string()
            || object_pk != target.object_id.to_string()
        {
            return Err(TokenError::TargetMismatch);
        }

        let timestamp: i64 = timestamp.parse().map_err(|_| TokenError::BadTimestamp)?;
        if timestamp < 0 || timestamp > now {
            return Err(TokenError::BadTimestamp);
        }
        let age = now
            .checked_sub(timestamp)
            .and_then(|age| u64::try_from(age).ok())
            .ok_or(TokenError::BadTimestamp)?;
        if age > self.max_age.as_secs() {
            return Err(TokenError::Expired);
        }

        let expected = URL_SAFE_NO_PAD
            .decode(security_hash)
            .map_err(|_| TokenError::BadHash)?;
        self.mac(content_type, object_pk, parent, timestamp)
            .ok_or(TokenError::BadHash)?
            .verify_slice(&expected)
            .map_err(|_| TokenError::BadHash)
    }
}
