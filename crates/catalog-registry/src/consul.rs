//! Adapter for the Consul agent HTTP API.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use catalog_types::{CheckKind, Fingerprint, Service, ServiceCheck, ServiceDomain, ServiceKey};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use url::Url;

use crate::config::{ConsulConfig, RegistryConfigError};
use crate::error::RegistryError;
use crate::traits::{RegisteredService, RegistrationId, ServiceRegistry};
use crate::{META_DOMAIN, META_FINGERPRINT, META_KEY, META_PAYLOAD};

const TOKEN_HEADER: &str = "X-Consul-Token";

/// Registers services with the local Consul agent.
pub struct ConsulAgentRegistry {
    client: Client,
    base: Url,
    token: Option<String>,
    id_prefix: String,
}

impl ConsulAgentRegistry {
    pub fn new(config: ConsulConfig) -> Result<Self, RegistryConfigError> {
        let base = config.base_url()?;
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base,
            token: config.token,
            id_prefix: config.id_prefix,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RegistryError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RegistryError::unavailable(format!("{} cannot be a base url", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.header(TOKEN_HEADER, token),
            None => req,
        }
    }

    /// Turn an agent entry into an attributed one, or `None` if this adapter
    /// did not create it.
    ///
    /// The fingerprint recorded at registration is trusted only while the
    /// entry's tags, address and port still hash to the recorded payload
    /// digest. An entry edited behind our back reports an empty fingerprint,
    /// which matches no definition and so forces a re-register.
    fn attribute(&self, entry: AgentService) -> Option<RegisteredService> {
        let meta = entry.meta.unwrap_or_default();
        let domain = ServiceDomain::new(meta.get(META_DOMAIN)?.clone());
        let key = ServiceKey::parse(meta.get(META_KEY)?).ok()?;
        let id = RegistrationId::new(&self.id_prefix, &domain, &key);
        if id.as_str() != entry.id {
            return None;
        }
        let observed = payload_digest(
            entry.tags.as_deref().unwrap_or_default(),
            entry.address.as_deref().unwrap_or_default(),
            entry.port.unwrap_or_default(),
        );
        let fingerprint = match (meta.get(META_FINGERPRINT), meta.get(META_PAYLOAD)) {
            (Some(fingerprint), Some(recorded)) if *recorded == observed => {
                Fingerprint::from_raw(fingerprint.clone())
            }
            _ => {
                debug!(id = %id, "agent entry drifted from its registration");
                Fingerprint::from_raw(String::new())
            }
        };
        Some(RegisteredService {
            id,
            domain,
            key,
            name: entry.service,
            fingerprint,
        })
    }
}

fn transport(op: &str, err: reqwest::Error) -> RegistryError {
    RegistryError::unavailable(format!("{op}: {err}"))
}

/// Classify a failed register. Only a refused payload is `Rejected`. Any
/// other answer, such as an ACL denial or throttling, may clear on its own.
async fn register_failure(resp: Response) -> RegistryError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            RegistryError::rejected(status.as_u16(), body)
        }
        _ => RegistryError::unavailable(format!("register service: status {status}: {body}")),
    }
}

/// Digest of the payload fields the agent echoes back on list. Absent values
/// hash like the agent's zero values, since that is how it reports them.
fn payload_digest(tags: &[String], address: &str, port: u16) -> String {
    let mut hasher = Sha256::new();
    hasher.update((tags.len() as u64).to_le_bytes());
    for tag in tags {
        hasher.update((tag.len() as u64).to_le_bytes());
        hasher.update(tag.as_bytes());
    }
    hasher.update((address.len() as u64).to_le_bytes());
    hasher.update(address.as_bytes());
    hasher.update(port.to_le_bytes());
    hex::encode(&hasher.finalize()[..16])
}

#[async_trait]
impl ServiceRegistry for ConsulAgentRegistry {
    async fn list_services(&self) -> Result<Vec<RegisteredService>, RegistryError> {
        let url = self.endpoint(&["v1", "agent", "services"])?;
        let resp = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| transport("list services", e))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(RegistryError::unavailable(format!(
                "list services: status {status}: {body}"
            )));
        }
        let entries: HashMap<String, AgentService> = resp
            .json()
            .await
            .map_err(|e| transport("decode service list", e))?;
        let total = entries.len();
        let attributed: Vec<_> = entries
            .into_values()
            .filter_map(|entry| self.attribute(entry))
            .collect();
        debug!(total, attributed = attributed.len(), "listed agent services");
        Ok(attributed)
    }

    async fn register(
        &self,
        domain: &ServiceDomain,
        key: &ServiceKey,
        service: &Service,
    ) -> Result<(), RegistryError> {
        let id = RegistrationId::new(&self.id_prefix, domain, key);
        let fingerprint = service.fingerprint();
        let payload = payload_digest(
            &service.tags,
            service.address.as_deref().unwrap_or_default(),
            service.port.unwrap_or_default(),
        );
        let body = AgentServiceRegistration {
            id: id.as_str(),
            name: &service.name,
            tags: &service.tags,
            address: service.address.as_deref(),
            port: service.port,
            meta: BTreeMap::from([
                (META_DOMAIN, domain.as_str()),
                (META_KEY, key.as_str()),
                (META_FINGERPRINT, fingerprint.as_str()),
                (META_PAYLOAD, payload.as_str()),
            ]),
            checks: service.checks.iter().map(AgentCheck::from_check).collect(),
        };
        let url = self.endpoint(&["v1", "agent", "service", "register"])?;
        let resp = self
            .authorize(self.client.put(url))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport("register service", e))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(register_failure(resp).await)
        }
    }

    async fn deregister(
        &self,
        domain: &ServiceDomain,
        key: &ServiceKey,
    ) -> Result<(), RegistryError> {
        let id = RegistrationId::new(&self.id_prefix, domain, key);
        let url = self.endpoint(&["v1", "agent", "service", "deregister", id.as_str()])?;
        let resp = self
            .authorize(self.client.put(url))
            .send()
            .await
            .map_err(|e| transport("deregister service", e))?;
        let status = resp.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        // Older agents answer 500 for ids they do not know.
        if body.contains("Unknown service") {
            return Ok(());
        }
        let err =
            RegistryError::unavailable(format!("deregister service: status {status}: {body}"));
        warn!(id = %id, error = %err, "deregister failed");
        Err(err)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AgentService {
    #[serde(rename = "ID")]
    id: String,
    service: String,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    meta: Option<HashMap<String, String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    tags: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    meta: BTreeMap<&'a str, &'a str>,
    checks: Vec<AgentCheck>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentCheck {
    name: String,
    #[serde(rename = "HTTP", skip_serializing_if = "Option::is_none")]
    http: Option<String>,
    #[serde(rename = "TCP", skip_serializing_if = "Option::is_none")]
    tcp: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    args: Vec<String>,
    #[serde(rename = "TTL", skip_serializing_if = "Option::is_none")]
    ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<String>,
}

impl AgentCheck {
    fn from_check(check: &ServiceCheck) -> Self {
        let mut out = AgentCheck {
            name: check.name.clone(),
            ..Default::default()
        };
        match &check.kind {
            CheckKind::Http { url } => out.http = Some(url.clone()),
            CheckKind::Tcp { address } => out.tcp = Some(address.clone()),
            CheckKind::Script { command, args } => {
                out.args = std::iter::once(command.clone())
                    .chain(args.iter().cloned())
                    .collect();
            }
            CheckKind::Ttl { ttl } => {
                out.ttl = Some(go_duration(*ttl));
                return out;
            }
        }
        out.interval = Some(go_duration(check.interval));
        out.timeout = Some(go_duration(check.timeout));
        out
    }
}

/// Render a duration the way the agent parses it (`10s`, `1500ms`).
fn go_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{ms}ms")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> ConsulAgentRegistry {
        ConsulAgentRegistry::new(ConsulConfig::default()).unwrap()
    }

    fn agent_entry(id: &str, name: &str, meta: &[(&str, &str)]) -> AgentService {
        AgentService {
            id: id.into(),
            service: name.into(),
            tags: None,
            address: None,
            port: None,
            meta: Some(
                meta.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
        }
    }

    #[test]
    fn attribution_requires_matching_id() {
        let registry = adapter();
        let svc = Service::new("foo");
        let key = svc.key();
        let domain = ServiceDomain::executor("1234", "foo");
        let id = RegistrationId::new("_catalog", &domain, &key);
        let payload = payload_digest(&[], "", 0);
        let meta = [
            (META_DOMAIN, domain.as_str()),
            (META_KEY, key.as_str()),
            (META_FINGERPRINT, "abc"),
            (META_PAYLOAD, payload.as_str()),
        ];

        let owned = registry
            .attribute(agent_entry(id.as_str(), "foo", &meta))
            .unwrap();
        assert_eq!(owned.domain, domain);
        assert_eq!(owned.fingerprint.as_str(), "abc");

        // Same metadata copied onto a differently named registration.
        let spoofed = format!("{}bar", id.as_str());
        assert!(registry.attribute(agent_entry(&spoofed, "foo", &meta)).is_none());
        assert!(registry.attribute(agent_entry("consul", "consul", &[])).is_none());
    }

    #[test]
    fn edited_payload_reports_drift() {
        let registry = adapter();
        let svc = Service::new("web");
        let key = svc.key();
        let domain = ServiceDomain::new("exec-1");
        let id = RegistrationId::new("_catalog", &domain, &key);
        let tags = vec!["http".to_string()];
        let payload = payload_digest(&tags, "", 8080);
        let meta = [
            (META_DOMAIN, domain.as_str()),
            (META_KEY, key.as_str()),
            (META_FINGERPRINT, "abc"),
            (META_PAYLOAD, payload.as_str()),
        ];

        let mut entry = agent_entry(id.as_str(), "web", &meta);
        entry.tags = Some(tags.clone());
        entry.port = Some(8080);
        entry.address = Some(String::new());
        let intact = registry.attribute(entry).unwrap();
        assert_eq!(intact.fingerprint.as_str(), "abc");

        let mut entry = agent_entry(id.as_str(), "web", &meta);
        entry.tags = Some(tags);
        entry.port = Some(1);
        let drifted = registry.attribute(entry).unwrap();
        assert_eq!(drifted.fingerprint.as_str(), "");

        // Entries written before payload digests were recorded re-register once.
        let legacy = &meta[..3];
        let entry = agent_entry(id.as_str(), "web", legacy);
        assert_eq!(registry.attribute(entry).unwrap().fingerprint.as_str(), "");
    }

    #[test]
    fn payload_digest_separates_fields() {
        assert_ne!(
            payload_digest(&["ab".into()], "", 0),
            payload_digest(&["a".into(), "b".into()], "", 0)
        );
        assert_ne!(
            payload_digest(&["a".into()], "b", 0),
            payload_digest(&["ab".into()], "", 0)
        );
    }

    #[test]
    fn check_translation() {
        let http = ServiceCheck {
            name: "alive".into(),
            kind: CheckKind::Http {
                url: "http://localhost/health".into(),
            },
            interval: Duration::from_secs(10),
            timeout: Duration::from_millis(1500),
        };
        let wire = serde_json::to_value(AgentCheck::from_check(&http)).unwrap();
        assert_eq!(
            wire,
            serde_json::json!({
                "Name": "alive",
                "HTTP": "http://localhost/health",
                "Interval": "10s",
                "Timeout": "1500ms",
            })
        );

        let ttl = ServiceCheck {
            name: "heartbeat".into(),
            kind: CheckKind::Ttl {
                ttl: Duration::from_secs(30),
            },
            interval: Duration::ZERO,
            timeout: Duration::ZERO,
        };
        let wire = serde_json::to_value(AgentCheck::from_check(&ttl)).unwrap();
        assert_eq!(wire, serde_json::json!({ "Name": "heartbeat", "TTL": "30s" }));
    }
}
