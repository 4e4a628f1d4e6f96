// src/web/webhook.rs

//! Webhook registration with the bot platform and the per-call secret check.

use crate::bot::WebhookRegistration;
use crate::errors::WebError;
use crate::runtime::Runtime;
use anyhow::Result;

/// Header the platform uses to echo the registered secret.
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// No secret configured: nothing to check. Otherwise the header must match exactly.
pub fn verify_secret(expected: Option<&str>, got: Option<&str>) -> Result<(), WebError> {
    match expected {
        None => Ok(()),
        Some(expected) if got == Some(expected) => Ok(()),
        Some(_) => Err(WebError::InvalidSecret),
    }
}

pub fn registration(runtime: &Runtime) -> Result<WebhookRegistration> {
    let web = &runtime.settings().web;
    Ok(WebhookRegistration {
        url: web.webhook_url(),
        secret_token: web.secret().map(str::to_owned),
        allowed_update_kinds: runtime.dispatcher()?.resolve_used_update_types(),
        drop_pending_updates: true,
    })
}

pub async fn register_webhook(runtime: &Runtime) -> Result<WebhookRegistration> {
    let registration = registration(runtime)?;
    runtime.bot()?.set_webhook(&registration).await?;
    tracing::info!(
        "webhook registered at {} for {:?}",
        registration.url,
        registration.allowed_names()
    );
    Ok(registration)
}

pub async fn revoke_webhook(runtime: &Runtime) -> Result<()> {
    runtime.bot()?.delete_webhook().await?;
    tracing::info!("webhook revoked");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_secret() {
        assert!(verify_secret(None, None).is_ok());
        assert!(verify_secret(None, Some("anything")).is_ok());
        assert!(verify_secret(Some("s3cr3t"), Some("s3cr3t")).is_ok());
        assert!(matches!(verify_secret(Some("s3cr3t"), Some("nope")), Err(WebError::InvalidSecret)));
        assert!(matches!(verify_secret(Some("s3cr3t"), None), Err(WebError::InvalidSecret)));
    }
}
