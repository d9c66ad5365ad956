//! JSON-over-HTTP account client
//!
//! | Call              | Request                 | Success                          |
//! |-------------------|-------------------------|----------------------------------|
//! | `login`           | `POST {base}/login`     | `200 {token, account_id?}`       |
//! | `change_password` | `POST {base}/password`  | `200` done, `202 {confirmation}` |
//! | `confirm`         | `POST {base}/confirm`   | `200 {status}`                   |
//!
//! Authenticated calls carry `Authorization: Bearer <token>`. Timeouts,
//! connection failures, `429` and `5xx` are transient; `401` carries an
//! `error` code mapped to [`AuthRejection`]; any other `4xx` is an
//! authoritative rejection.

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Deserialize;

use super::{
    AuthRejection, ChangeResult, ConfirmResult, ConfirmationPayload, PendingConfirmation,
    RemoteAccountClient, RemoteError, Session,
};
use crate::codegen::{ConfirmationSignature, OneTimeCode};
use crate::config::RemoteConfig;
use crate::core::SecretString;

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
    #[serde(default)]
    account_id: Option<u64>,
}

#[derive(Deserialize)]
struct ConfirmResponse {
    status: ConfirmResult,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// [`RemoteAccountClient`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpAccountClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAccountClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("rotator/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn post(
        &self,
        path: &str,
        session: Option<&Session>,
        body: serde_json::Value,
    ) -> Result<Response, RemoteError> {
        let mut request = self.client.post(self.url(path)).json(&body);
        if let Some(session) = session {
            request = session
                .token
                .expose_secret(|token| request.bearer_auth(token));
        }
        let response = request.send().await.map_err(transport_error)?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(status_error(response).await)
        }
    }
}

fn transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() || error.is_connect() || error.is_request() || error.is_body() {
        RemoteError::Transient(error.to_string())
    } else if error.is_decode() {
        RemoteError::Transient(format!("malformed response: {error}"))
    } else {
        RemoteError::Rejected(error.to_string())
    }
}

async fn status_error(response: Response) -> RemoteError {
    let status = response.status();
    let body: ErrorBody = response.json().await.unwrap_or_default();
    classify(status, &body)
}

fn classify(status: StatusCode, body: &ErrorBody) -> RemoteError {
    let message = body
        .message
        .clone()
        .or_else(|| body.error.clone())
        .unwrap_or_else(|| status.to_string());

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return RemoteError::Transient(message);
    }
    if status == StatusCode::UNAUTHORIZED {
        let rejection = match body.error.as_deref() {
            Some("invalid_code") => AuthRejection::InvalidCode,
            Some("locked") => AuthRejection::Locked,
            _ => AuthRejection::InvalidCredentials,
        };
        return RemoteError::AuthRejected(rejection);
    }
    if status == StatusCode::LOCKED {
        return RemoteError::AuthRejected(AuthRejection::Locked);
    }
    RemoteError::Rejected(message)
}

#[async_trait]
impl RemoteAccountClient for HttpAccountClient {
    async fn login(
        &self,
        login: &str,
        password: &SecretString,
        code: &OneTimeCode,
    ) -> Result<Session, RemoteError> {
        let body = password.expose_secret(|password| {
            serde_json::json!({
                "login": login,
                "password": password,
                "code": code.as_str(),
            })
        });
        let response = self.post("login", None, body).await?;
        let parsed: LoginResponse = response.json().await.map_err(transport_error)?;
        Ok(Session {
            token: SecretString::new(parsed.token),
            account_id: parsed.account_id,
        })
    }

    async fn change_password(
        &self,
        session: &Session,
        new_password: &SecretString,
    ) -> Result<ChangeResult, RemoteError> {
        let body = new_password
            .expose_secret(|password| serde_json::json!({ "new_password": password }));
        let response = self.post("password", Some(session), body).await?;
        if response.status() == StatusCode::ACCEPTED {
            let pending: PendingConfirmation =
                response.json().await.map_err(transport_error)?;
            Ok(ChangeResult::ConfirmationRequired(pending))
        } else {
            Ok(ChangeResult::Completed)
        }
    }

    async fn confirm(
        &self,
        session: &Session,
        signature: &ConfirmationSignature,
        payload: &ConfirmationPayload,
    ) -> Result<ConfirmResult, RemoteError> {
        let body = serde_json::json!({
            "confirmation_id": payload.confirmation_id,
            "tag": payload.tag,
            "issued_at": payload.issued_at,
            "device_id": payload.device_id,
            "account_id": payload.account_id,
            "signature": signature.to_base64(),
        });
        let response = self.post("confirm", Some(session), body).await?;
        let parsed: ConfirmResponse = response.json().await.map_err(transport_error)?;
        Ok(parsed.status)
    }
}
