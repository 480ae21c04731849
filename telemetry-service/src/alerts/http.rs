use std::time::Duration;

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use super::{Alert, AlertChannel, AlertPayload};
use crate::reconciler::DashboardError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Phone-style channel: the payload also carries a destination and a text message.
    Sms,
    /// Chat/ops channel: the bare alert payload.
    Ops,
}

#[derive(Serialize)]
struct SmsBody<'a> {
    phone: Option<&'a str>,
    message: String,
    #[serde(flatten)]
    alert: &'a AlertPayload,
}

#[derive(Deserialize)]
struct ChannelResponse {
    #[serde(default)]
    success: bool,
}

fn sms_message(alert: &AlertPayload) -> String {
    format!(
        "ALERT: {} on meter {} at {} ({})",
        alert.status,
        alert.meter_id,
        alert.location,
        alert
            .time
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default()
    )
}

/// Notification backend endpoint answering `{"success": bool}`.
pub struct HttpAlertChannel {
    name: String,
    kind: ChannelKind,
    url: Url,
    client: Client,
}

impl HttpAlertChannel {
    pub fn new(
        name: impl Into<String>,
        kind: ChannelKind,
        url: &str,
        timeout: Duration,
    ) -> Result<Self, DashboardError> {
        let name = name.into();
        let url = Url::parse(url)
            .map_err(|e| DashboardError::Alert(format!("invalid url for channel '{name}': {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DashboardError::Alert(format!("failed to build http client: {e}")))?;
        Ok(Self { name, kind, url, client })
    }
}

#[async_trait::async_trait]
impl AlertChannel for HttpAlertChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, alert: &Alert) -> Result<(), DashboardError> {
        let request = self.client.post(self.url.clone());
        let request = match self.kind {
            ChannelKind::Sms => request.json(&SmsBody {
                phone: alert.phone.as_deref(),
                message: sms_message(&alert.payload),
                alert: &alert.payload,
            }),
            ChannelKind::Ops => request.json(&alert.payload),
        };

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DashboardError::Alert(format!("{}: request failed: {e}", self.name)))?;
        let body: ChannelResponse = response
            .json()
            .await
            .map_err(|e| DashboardError::Alert(format!("{}: invalid response: {e}", self.name)))?;

        if body.success {
            Ok(())
        } else {
            Err(DashboardError::Alert(format!("{}: backend reported failure", self.name)))
        }
    }
}
