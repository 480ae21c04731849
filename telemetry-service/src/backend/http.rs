use std::time::Duration;

use meter_client::{history, BillRecord, BillingSnapshot, ChartPoint, PurchaseRequest, TelemetrySnapshot};
use reqwest::{Client, Url};
use serde_json::Value;
use time::OffsetDateTime;

use super::StatsBackend;
use crate::reconciler::DashboardError;

/// reqwest-backed [`StatsBackend`].
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DashboardError> {
        // Relative joins drop the last path segment unless the base ends in '/'.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base = Url::parse(&normalized)
            .map_err(|e| DashboardError::Backend(format!("invalid base url '{base_url}': {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DashboardError::Backend(format!("failed to build http client: {e}")))?;
        Ok(Self { client, base })
    }

    fn url(&self, path: &str) -> Result<Url, DashboardError> {
        self.base
            .join(path)
            .map_err(|e| DashboardError::Backend(format!("invalid path '{path}': {e}")))
    }

    async fn get_json(&self, path: &str) -> Result<Value, DashboardError> {
        let url = self.url(path)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DashboardError::Backend(format!("GET {path} failed: {e}")))?;
        response
            .json::<Value>()
            .await
            .map_err(|e| DashboardError::Backend(format!("GET {path} returned invalid json: {e}")))
    }
}

#[async_trait::async_trait]
impl StatsBackend for HttpBackend {
    async fn fetch_stats(&self) -> Result<TelemetrySnapshot, DashboardError> {
        let body = self.get_json("stats").await?;
        Ok(TelemetrySnapshot::from_value(&body))
    }

    async fn fetch_latest_billing(&self) -> Result<Option<BillingSnapshot>, DashboardError> {
        let body = self.get_json("billing/latest").await?;
        Ok(BillingSnapshot::from_latest(&body))
    }

    async fn fetch_billing_history(&self) -> Result<Vec<BillRecord>, DashboardError> {
        let body = self.get_json("billing").await?;
        Ok(BillRecord::list_from_value(&body))
    }

    async fn fetch_energy_history(&self, now: OffsetDateTime) -> Result<Vec<ChartPoint>, DashboardError> {
        let body = self.get_json("chart?type=energy").await?;
        Ok(history::consumption_from_value(&body, now))
    }

    async fn record_purchase(&self, purchase: &PurchaseRequest) -> Result<(), DashboardError> {
        let url = self.url("billing")?;
        let response = self
            .client
            .post(url)
            .json(purchase)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DashboardError::Backend(format!("POST billing failed: {e}")))?;

        // Some deployments answer with an empty body; only an explicit
        // `success: false` is a rejection.
        let body: Option<Value> = response.json().await.ok();
        if let Some(false) = body.as_ref().and_then(|b| b.get("success")).and_then(Value::as_bool) {
            return Err(DashboardError::Backend("POST billing was rejected".to_string()));
        }

        tracing::info!(id = purchase.id, units = purchase.units, "purchase recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_trailing_slash() {
        let backend = HttpBackend::new("http://localhost:8080/api", Duration::from_secs(1)).unwrap();
        assert_eq!(
            backend.url("billing/latest").unwrap().as_str(),
            "http://localhost:8080/api/billing/latest"
        );
        assert_eq!(
            backend.url("chart?type=energy").unwrap().as_str(),
            "http://localhost:8080/api/chart?type=energy"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            HttpBackend::new("not a url", Duration::from_secs(1)),
            Err(DashboardError::Backend(_))
        ));
    }
}
