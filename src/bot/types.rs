// src/bot/types.rs
use crate::update::UpdateKindTag;
use std::collections::BTreeSet;

/// What gets registered with the platform while the runtime is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRegistration {
    pub url: String,
    pub secret_token: Option<String>,
    pub allowed_update_kinds: BTreeSet<UpdateKindTag>,
    /// Drop anything queued upstream before this registration.
    pub drop_pending_updates: bool,
}

impl WebhookRegistration {
    pub fn allowed_names(&self) -> Vec<&'static str> {
        self.allowed_update_kinds.iter().map(|k| k.as_str()).collect()
    }
}
