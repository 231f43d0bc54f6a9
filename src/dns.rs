//! DNS provisioner: the single idempotent CNAME operation that makes a
//! managed subdomain resolve to the storage website endpoint.
//!
//! Thin by design. "Already exists" on create and "already gone" on
//! remove are normalised to success so both operations are safely
//! re-runnable. Only managed subdomains ever reach this module; custom
//! domains are left to their owners.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::contract::{BackendError, DnsProvider, DnsRecord, NewDnsRecord};
use crate::error::DnsError;

/// Ensures or removes the CNAME for a site through a [`DnsProvider`].
pub struct Provisioner<D> {
    client: D,
    /// Target host for the CNAME, e.g. the storage website endpoint.
    endpoint_host: String,
}

impl<D: DnsProvider> Provisioner<D> {
    pub fn new(client: D, endpoint_host: impl Into<String>) -> Self {
        Self {
            client,
            endpoint_host: endpoint_host.into(),
        }
    }

    /// Create the CNAME `label -> endpoint host`, proxied at the edge.
    /// A backend report that the record already exists is success.
    pub async fn ensure_cname(&self, label: &str) -> Result<(), DnsError> {
        let req = NewDnsRecord {
            record_type: "CNAME",
            name: label,
            content: &self.endpoint_host,
            proxied: true,
        };
        match self.client.create_record(req).await {
            Ok(record) => {
                info!(label, target = %record.content, "created CNAME record");
                Ok(())
            }
            Err(e) if e.to_string().to_ascii_lowercase().contains("already exists") => {
                debug!(label, "CNAME record already exists");
                Ok(())
            }
            Err(e) => Err(DnsError(format!("create CNAME for '{label}': {e}"))),
        }
    }

    /// Delete the record matching `fqdn` exactly. Zero matches is
    /// success (already gone); otherwise the first match is deleted.
    pub async fn remove_cname(&self, fqdn: &str) -> Result<(), DnsError> {
        let records = self
            .client
            .find_records(fqdn)
            .await
            .map_err(|e| DnsError(format!("lookup records for '{fqdn}': {e}")))?;

        let Some(record) = records.first() else {
            debug!(fqdn, "no DNS record to remove");
            return Ok(());
        };

        self.client
            .delete_record(&record.id)
            .await
            .map_err(|e| DnsError(format!("delete record '{}': {e}", record.id)))?;
        info!(fqdn, id = %record.id, "removed CNAME record");
        Ok(())
    }
}

/// Cloudflare-backed [`DnsProvider`] over the v4 JSON API.
pub struct CloudflareDns {
    http: reqwest::Client,
    api_token: String,
    zone_id: String,
    base_url: String,
}

#[derive(Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiErrorBody>,
    result: Option<T>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct ApiRecord {
    id: String,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    content: String,
}

impl From<ApiRecord> for DnsRecord {
    fn from(r: ApiRecord) -> Self {
        DnsRecord {
            id: r.id,
            record_type: r.record_type,
            name: r.name,
            content: r.content,
        }
    }
}

impl CloudflareDns {
    pub fn new(api_token: impl Into<String>, zone_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_token: api_token.into(),
            zone_id: zone_id.into(),
            base_url: "https://api.cloudflare.com/client/v4".into(),
        }
    }

    /// Construct from `CLOUDFLARE_API_TOKEN` and `CLOUDFLARE_ZONE_ID`,
    /// loading a `.env` file if present.
    pub fn new_from_env() -> Result<Self, BackendError> {
        dotenvy::dotenv().ok();
        let api_token = std::env::var("CLOUDFLARE_API_TOKEN")?;
        let zone_id = std::env::var("CLOUDFLARE_ZONE_ID")?;
        Ok(Self::new(api_token, zone_id))
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, self.zone_id)
    }

    fn unwrap_envelope<T>(envelope: ApiEnvelope<T>) -> Result<T, BackendError> {
        if !envelope.success {
            let messages: Vec<String> = envelope
                .errors
                .iter()
                .map(|e| format!("{} (code {})", e.message, e.code))
                .collect();
            return Err(format!("cloudflare API error: {}", messages.join("; ")).into());
        }
        envelope
            .result
            .ok_or_else(|| "cloudflare API returned success without a result".into())
    }
}

#[async_trait]
impl DnsProvider for CloudflareDns {
    async fn create_record<'a>(&self, req: NewDnsRecord<'a>) -> Result<DnsRecord, BackendError> {
        let body = serde_json::json!({
            "type": req.record_type,
            "name": req.name,
            "content": req.content,
            "proxied": req.proxied,
        });
        let envelope: ApiEnvelope<ApiRecord> = self
            .http
            .post(self.records_url())
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;
        Ok(Self::unwrap_envelope(envelope)?.into())
    }

    async fn find_records(&self, name: &str) -> Result<Vec<DnsRecord>, BackendError> {
        let envelope: ApiEnvelope<Vec<ApiRecord>> = self
            .http
            .get(self.records_url())
            .bearer_auth(&self.api_token)
            .query(&[("name", name)])
            .send()
            .await?
            .json()
            .await?;
        let records = Self::unwrap_envelope(envelope)?;
        Ok(records.into_iter().map(Into::into).collect())
    }

    async fn delete_record(&self, id: &str) -> Result<(), BackendError> {
        let envelope: ApiEnvelope<serde_json::Value> = self
            .http
            .delete(format!("{}/{}", self.records_url(), id))
            .bearer_auth(&self.api_token)
            .send()
            .await?
            .json()
            .await?;
        Self::unwrap_envelope(envelope)?;
        Ok(())
    }
}
