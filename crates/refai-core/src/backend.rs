//! Thin client for the hosted auth and billing backend
//!
//! Sessions, checkout and the customer portal all live in the backend; this
//! module only signs in, asks whether the user is subscribed, and fetches the
//! URLs to open in a browser.

use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, error, info};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid email or password. Please try again.")]
    InvalidCredentials,

    #[error("This email is already registered. Please try logging in instead.")]
    AlreadyRegistered,

    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// A signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub email: String,
}

/// Result of the `check-subscription` function
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStatus {
    #[serde(default)]
    pub subscribed: bool,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub subscription_end: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl SubscriptionStatus {
    pub fn is_trialing(&self) -> bool {
        self.status.as_deref() == Some("trialing")
    }

    /// Short label for the status badge
    pub fn badge(&self) -> String {
        if !self.subscribed {
            return "No Active Subscription".to_string();
        }
        match self.status.as_deref() {
            Some("active") | None => "Active".to_string(),
            Some(other) => other.to_string(),
        }
    }

    /// Label and date of the next billing event, if subscribed
    pub fn renewal(&self) -> Option<(&'static str, &str)> {
        if !self.subscribed {
            return None;
        }
        let end = self.subscription_end.as_deref()?;
        let label = if self.is_trialing() { "Trial ends" } else { "Next billing" };
        // The backend sends an ISO timestamp; only the date is shown
        Some((label, end.split('T').next().unwrap_or(end)))
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    user: Option<UserResponse>,
}

#[derive(Deserialize)]
struct UserResponse {
    email: Option<String>,
}

#[derive(Deserialize)]
struct UrlResponse {
    url: Option<String>,
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"))
}

/// Check form input before anything is sent. `username` is only required for sign-up.
pub fn validate_credentials(email: &str, password: &str, username: Option<&str>) -> Result<(), BackendError> {
    if !email_regex().is_match(email.trim()) {
        return Err(BackendError::Validation("Please enter a valid email address".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(BackendError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if let Some(username) = username {
        if username.trim().is_empty() {
            return Err(BackendError::Validation("Username is required".to_string()));
        }
    }
    Ok(())
}

/// Pull a human-readable message out of whatever error shape the backend sent.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| body.to_string())
}

#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl BackendClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        validate_credentials(email, password, None)?;

        let url = format!("{}/auth/v1/token?grant_type=password", self.base_url);
        let body = json!({ "email": email.trim(), "password": password });
        let response = self.post_json(&url, None, &body).await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = error_message(&response.text().await.unwrap_or_default());
            if message.contains("Invalid login credentials") {
                return Err(BackendError::InvalidCredentials);
            }
            return Err(BackendError::Status { status, message });
        }

        let token: TokenResponse = response.json().await?;
        let session = self.session_from(token, email).ok_or_else(|| BackendError::Status {
            status: 200,
            message: "sign-in response carried no access token".to_string(),
        })?;
        info!("Signed in as {}", session.email);
        Ok(session)
    }

    /// Create an account. Returns no session when the backend wants the
    /// email confirmed first.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<Option<AuthSession>, BackendError> {
        validate_credentials(email, password, Some(username))?;

        let url = format!("{}/auth/v1/signup", self.base_url);
        let body = json!({
            "email": email.trim(),
            "password": password,
            "data": { "username": username.trim() },
        });
        let response = self.post_json(&url, None, &body).await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = error_message(&response.text().await.unwrap_or_default());
            if message.contains("User already registered") {
                return Err(BackendError::AlreadyRegistered);
            }
            return Err(BackendError::Status { status, message });
        }

        let token: TokenResponse = response.json().await?;
        Ok(self.session_from(token, email))
    }

    pub async fn sign_out(&self, session: &AuthSession) -> Result<(), BackendError> {
        let url = format!("{}/auth/v1/logout", self.base_url);
        let response = self.post_json(&url, Some(session), &json!({})).await?;
        if !response.status().is_success() {
            debug!("Sign-out returned {}", response.status());
        }
        Ok(())
    }

    pub async fn check_subscription(&self, session: &AuthSession) -> Result<SubscriptionStatus, BackendError> {
        let value = self.invoke("check-subscription", session).await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    /// URL of a checkout page for a new subscription
    pub async fn create_checkout(&self, session: &AuthSession) -> Result<Option<String>, BackendError> {
        let value = self.invoke("create-checkout", session).await?;
        Ok(serde_json::from_value::<UrlResponse>(value).ok().and_then(|r| r.url))
    }

    /// URL of the billing portal for an existing subscription
    pub async fn customer_portal(&self, session: &AuthSession) -> Result<Option<String>, BackendError> {
        let value = self.invoke("customer-portal", session).await?;
        Ok(serde_json::from_value::<UrlResponse>(value).ok().and_then(|r| r.url))
    }

    async fn invoke(&self, function: &str, session: &AuthSession) -> Result<Value, BackendError> {
        let url = format!("{}/functions/v1/{}", self.base_url, function);
        let response = self.post_json(&url, Some(session), &json!({})).await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = error_message(&response.text().await.unwrap_or_default());
            error!("Backend function {} failed: {} {}", function, status, message);
            return Err(BackendError::Status { status, message });
        }

        Ok(response.json().await?)
    }

    async fn post_json(
        &self,
        url: &str,
        session: Option<&AuthSession>,
        body: &Value,
    ) -> Result<reqwest::Response, BackendError> {
        let bearer = session.map(|s| s.access_token.as_str()).unwrap_or(&self.api_key);
        let response = self
            .client
            .post(url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", bearer))
            .json(body)
            .send()
            .await?;
        Ok(response)
    }

    fn session_from(&self, token: TokenResponse, email: &str) -> Option<AuthSession> {
        let access_token = token.access_token?;
        let email = token
            .user
            .and_then(|u| u.email)
            .unwrap_or_else(|| email.trim().to_string());
        Some(AuthSession { access_token, email })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_credentials() {
        assert!(validate_credentials("ref@fiba.basketball", "secret1", None).is_ok());
        assert!(matches!(
            validate_credentials("not-an-email", "secret1", None),
            Err(BackendError::Validation(_))
        ));
        assert!(matches!(
            validate_credentials("ref@fiba.basketball", "12345", None),
            Err(BackendError::Validation(_))
        ));
        assert!(matches!(
            validate_credentials("ref@fiba.basketball", "secret1", Some("  ")),
            Err(BackendError::Validation(_))
        ));
        assert!(validate_credentials("ref@fiba.basketball", "secret1", Some("whistle")).is_ok());
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(
            error_message(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#),
            "Invalid login credentials"
        );
        assert_eq!(error_message(r#"{"code":422,"msg":"User already registered"}"#), "User already registered");
        assert_eq!(error_message("plain text"), "plain text");
    }

    #[test]
    fn test_subscription_badge_and_renewal() {
        let none = SubscriptionStatus::default();
        assert_eq!(none.badge(), "No Active Subscription");
        assert!(none.renewal().is_none());

        let trial = SubscriptionStatus {
            subscribed: true,
            product_id: Some("prod_refai".to_string()),
            subscription_end: Some("2026-11-01T00:00:00Z".to_string()),
            status: Some("trialing".to_string()),
        };
        assert_eq!(trial.badge(), "trialing");
        assert_eq!(trial.renewal(), Some(("Trial ends", "2026-11-01")));

        let active = SubscriptionStatus {
            status: Some("active".to_string()),
            ..trial
        };
        assert_eq!(active.badge(), "Active");
        assert_eq!(active.renewal(), Some(("Next billing", "2026-11-01")));
    }

    #[test]
    fn test_subscription_status_tolerates_missing_fields() {
        let status: SubscriptionStatus = serde_json::from_str(r#"{"subscribed": true}"#).unwrap();
        assert!(status.subscribed);
        assert!(status.status.is_none());
    }
}
