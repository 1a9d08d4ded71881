use crate::error::Error;
use crate::provider::RetryPolicy;
use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use trust_dns_server::client::rr::{LowerName, Name};

pub type SharedConfig = Arc<Config>;

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// Name of the DNS provider, resolved through the
    /// [`ProviderRegistry`][crate::provider::ProviderRegistry].
    pub provider: String,
    /// Zones served by the `"local"` provider.
    #[serde(default)]
    pub zones: Vec<String>,
    pub provider_state_path: Option<String>,
    pub store_state_path: Option<String>,
    pub api_bind_addr: SocketAddr,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub api_timeout: Duration,
    /// Upper bound on a whole present or clean-up call.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_deadline: Duration,
    /// Upper bound on a single provider call.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub provider_timeout: Duration,
    pub provider_attempts: u32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub provider_backoff_ms: Duration,
    /// How often committed host intents are re-applied to the provider. Unset disables the
    /// reconciliation job.
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    #[serde(default)]
    pub sync_interval: Option<Duration>,
    /// Administrators created at startup if missing.
    #[serde(default)]
    pub admins: Vec<AdminBootstrap>,
    /// Settings for the embedded authoritative DNS server.
    pub dns: Option<DnsConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AdminBootstrap {
    pub name: String,
    /// An argon2 PHC string, see [`crate::auth::password::hash_secret`].
    pub secret_hash: String,
}

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct DnsConfig {
    pub udp_bind_addr: SocketAddr,
    pub tcp_bind_addr: SocketAddr,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub tcp_timeout: Duration,
    pub ns_domain: LowerName,
    pub ns_admin: String,
    #[serde(default)]
    pub ns_records: HashMap<LowerName, Vec<LowerName>>,
}

impl Default for Config {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            provider: "local".to_string(),
            zones: Vec::default(),
            provider_state_path: None,
            store_state_path: None,
            api_bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 3000)),
            api_timeout: Duration::from_secs(30),
            request_deadline: Duration::from_secs(20),
            provider_timeout: retry.timeout,
            provider_attempts: retry.attempts,
            provider_backoff_ms: retry.backoff,
            sync_interval: None,
            admins: Vec::default(),
            dns: None,
        }
    }
}

impl Config {
    /// Load and validate a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] if the file can't be read, [`Error::InvalidJSON`] if it doesn't
    /// hold a valid config, and [`Error::InvalidDomain`] if a zone or the DNS admin address
    /// isn't a valid name.
    pub fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let f = File::open(p)?;
        let reader = BufReader::new(f);
        let conf: Config = serde_json::from_reader(reader)?;
        conf.validate()?;
        Ok(conf)
    }

    fn validate(&self) -> Result<(), Error> {
        for zone in &self.zones {
            crate::provider::fqdn(zone).map_err(|_| Error::InvalidDomain(zone.clone()))?;
        }
        if let Some(dns) = &self.dns {
            dns.ns_admin()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: self.provider_timeout,
            attempts: self.provider_attempts,
            backoff: self.provider_backoff_ms,
        }
    }
}

impl DnsConfig {
    /// The SOA `RNAME` form of the admin address: `dns-admin@example.com` becomes
    /// `dns-admin.example.com`, escaping dots in the local part.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDomain`] if the result isn't a valid name.
    pub fn ns_admin(&self) -> Result<Name, Error> {
        let sanitized = self.sanitized_ns_admin();
        Name::from_str(&sanitized).map_err(|_| Error::InvalidDomain(sanitized.into_owned()))
    }

    fn sanitized_ns_admin(&self) -> Cow<str> {
        match self.ns_admin.split_once('@') {
            Some((user, domain)) => {
                let user = user.replace('.', "\\.");
                Cow::Owned(format!("{user}.{domain}"))
            }
            _ => Cow::Borrowed(&self.ns_admin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const EXAMPLE: &str = r#"{
        "provider": "local",
        "zones": ["example.com"],
        "store_state_path": "/var/lib/acmehost/store.json",
        "api_bind_addr": "127.0.0.1:3000",
        "api_timeout": 30,
        "request_deadline": 20,
        "provider_timeout": 5,
        "provider_attempts": 4,
        "provider_backoff_ms": 250,
        "sync_interval": 300,
        "admins": [{ "name": "root", "secret_hash": "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA" }],
        "dns": {
            "udp_bind_addr": "127.0.0.1:5353",
            "tcp_bind_addr": "127.0.0.1:5353",
            "tcp_timeout": 5,
            "ns_domain": "ns1.example.com",
            "ns_admin": "dns.admin@example.com",
            "ns_records": { "example.com": ["ns1.example.com"] }
        }
    }"#;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_example_config() {
        let f = write_config(EXAMPLE);
        let config = Config::try_from_file(f.path()).unwrap();
        assert_eq!(config.provider, "local");
        assert_eq!(config.sync_interval, Some(Duration::from_secs(300)));
        assert_eq!(
            config.retry_policy(),
            RetryPolicy {
                timeout: Duration::from_secs(5),
                attempts: 4,
                backoff: Duration::from_millis(250),
            }
        );
        assert_eq!(config.admins[0].name, "root");
        let dns = config.dns.unwrap();
        assert_eq!(dns.ns_admin().unwrap().num_labels(), 3);
    }

    #[test]
    fn invalid_zone_is_rejected() {
        let zone = format!("\"{}.com\"]", "a".repeat(64));
        let f = write_config(&EXAMPLE.replace("\"example.com\"]", &zone));
        assert!(matches!(
            Config::try_from_file(f.path()),
            Err(Error::InvalidDomain(_))
        ));
    }

    #[test]
    fn invalid_json_is_rejected() {
        let f = write_config("{\"provider\": ");
        assert!(matches!(
            Config::try_from_file(f.path()),
            Err(Error::InvalidJSON(_))
        ));
    }
}
