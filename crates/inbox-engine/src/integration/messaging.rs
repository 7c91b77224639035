use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::Result;

/// Acknowledgement returned by the messaging collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReceipt {
    pub message_id: String,
}

/// Outbound template delivery (WhatsApp and similar channels)
///
/// Implementations report delivery failures as `Err`; callers record them
/// per item and carry on.
#[async_trait]
pub trait MessageDispatcher: Send + Sync {
    async fn send_template_message(
        &self,
        contact_id: &str,
        template_id: &str,
        params: &HashMap<String, String>,
    ) -> Result<MessageReceipt>;
}

/// Dispatcher that only logs; for deployments without a messaging gateway
#[derive(Debug, Default, Clone)]
pub struct LoggingDispatcher;

#[async_trait]
impl MessageDispatcher for LoggingDispatcher {
    async fn send_template_message(
        &self,
        contact_id: &str,
        template_id: &str,
        params: &HashMap<String, String>,
    ) -> Result<MessageReceipt> {
        let message_id = Uuid::new_v4().to_string();
        info!(
            "📨 Template {} queued for contact {} ({} params) as {}",
            template_id,
            contact_id,
            params.len(),
            message_id
        );
        Ok(MessageReceipt { message_id })
    }
}
