use crate::diff::{diff, domain_filter, Changes};
use ahash::AHashMap as HashMap;
use anyhow::{anyhow, Context, Result};
use base64::Engine;
use hickory_client::client::{Client, ClientHandle};
use hickory_proto::{
    dnssec::{rdata::tsig::TsigAlgorithm, tsig::TSigner},
    op::ResponseCode,
    rr::{rdata, record_data::RData, Name, Record as DnsRecord},
    runtime::TokioRuntimeProvider,
    tcp::TcpClientStream,
};
use local_dns_controller_core::{Record, RecordKey, RecordSet};
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// TTL applied to every record published into the zone.
const TTL: u32 = 300;

/// Bound on each dynamic update round trip.
const TIMEOUT: Duration = Duration::from_secs(10);

/// Publishes names into an authoritative zone with dynamic DNS updates over
/// TCP, optionally signed with a pre-shared TSIG key.
pub struct UnicastNameserver {
    server: SocketAddr,
    zone: Name,
    domain: String,
    key: Option<TsigKey>,
    published: HashMap<RecordKey, Record>,
}

struct TsigKey {
    name: Name,
    secret: Vec<u8>,
}

// === impl UnicastNameserver ===

impl UnicastNameserver {
    /// `domain` is the zone the server is authoritative for and the filter
    /// applied to snapshots; a trailing dot is enforced. The key, when
    /// present, is a `(name, base64 secret)` pair used to sign every update
    /// with hmac-sha256.
    pub fn new(server: IpAddr, domain: String, key: Option<(String, String)>) -> Result<Self> {
        let mut domain = domain;
        if !domain.ends_with('.') {
            domain.push('.');
        }
        let zone = domain
            .parse::<Name>()
            .with_context(|| format!("invalid domain {domain}"))?;

        let key = key
            .map(|(name, secret)| {
                let name = name
                    .parse::<Name>()
                    .with_context(|| format!("invalid key name {name}"))?;
                let secret = base64::engine::general_purpose::STANDARD
                    .decode(secret)
                    .context("key secret is not valid base64")?;
                Ok::<_, anyhow::Error>(TsigKey { name, secret })
            })
            .transpose()?;

        Ok(Self {
            server: SocketAddr::new(server, 53),
            zone,
            domain,
            key,
            published: HashMap::default(),
        })
    }

    /// Reconciles every snapshot until the registry goes away or shutdown is
    /// signaled. Published records are left in the zone; a restart converges
    /// through the natural diff.
    pub async fn run(mut self, mut snapshots: watch::Receiver<RecordSet>, drain: drain::Watch) {
        let shutdown = drain.signaled();
        tokio::pin!(shutdown);

        loop {
            let snapshot = snapshots.borrow_and_update().clone();
            self.reconcile(&snapshot).await;

            tokio::select! {
                res = snapshots.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
                handle = &mut shutdown => {
                    debug!("Shutting down");
                    drop(handle);
                    return;
                }
            }
        }
    }

    async fn reconcile(&mut self, snapshot: &RecordSet) {
        let desired = domain_filter(snapshot, &self.domain);
        let changes = diff(&self.published, &desired);
        if changes.is_empty() {
            return;
        }

        let mut client = match self.connect().await {
            Ok(client) => client,
            Err(error) => {
                info!(server = %self.server, %error, "Failed to reach the DNS server; will retry");
                return;
            }
        };

        let Changes {
            remove,
            add,
            modify,
        } = changes;

        for record in remove {
            match delete(&mut client, &self.zone, &record).await {
                Ok(()) => {
                    info!(fqdn = %record.fqdn(), ip = %record.ip, "Removed record");
                    self.published.remove(&record.key());
                }
                // Leave the record published so the removal is retried on
                // the next snapshot.
                Err(error) => warn!(fqdn = %record.fqdn(), %error, "Failed to remove record"),
            }
        }
        for record in add.into_iter().chain(modify) {
            match replace(&mut client, &self.zone, &record).await {
                Ok(()) => {
                    info!(fqdn = %record.fqdn(), ip = %record.ip, "Published record");
                    self.published.insert(record.key(), record);
                }
                Err(error) => {
                    warn!(fqdn = %record.fqdn(), %error, "Failed to publish record; leaving unpublished")
                }
            }
        }
    }

    /// Opens a fresh TCP client for one reconcile pass, attaching the TSIG
    /// signer when a key is configured.
    async fn connect(&self) -> Result<Client> {
        let (stream, sender) =
            TcpClientStream::new(self.server, None, Some(TIMEOUT), TokioRuntimeProvider::new());

        let (client, bg) = match &self.key {
            Some(TsigKey { name, secret }) => {
                let signer = TSigner::new(
                    secret.clone(),
                    TsigAlgorithm::HmacSha256,
                    name.clone(),
                    60,
                )?;
                Client::new(stream, sender, Some(Arc::new(signer))).await?
            }
            None => Client::new(stream, sender, None).await?,
        };
        tokio::spawn(bg);
        Ok(client)
    }
}

/// Builds the zone record for a registry record: A for IPv4 values, AAAA for
/// IPv6.
fn dns_record(record: &Record) -> Result<DnsRecord> {
    let name = record
        .fqdn()
        .parse::<Name>()
        .with_context(|| format!("invalid record name {}", record.fqdn()))?;
    let rdata = match record.ip {
        IpAddr::V4(ip) => RData::A(rdata::A(ip)),
        IpAddr::V6(ip) => RData::AAAA(rdata::AAAA(ip)),
    };
    Ok(DnsRecord::from_rdata(name, TTL, rdata))
}

/// Replaces the record's address RRset in the zone.
async fn replace(client: &mut Client, zone: &Name, record: &Record) -> Result<()> {
    let rec = dns_record(record)?;
    let rrset = DnsRecord::update0(rec.name().clone(), TTL, rec.record_type());

    let response = client.delete_rrset(rrset, zone.clone()).await?;
    if response.response_code() != ResponseCode::NoError {
        return Err(anyhow!("server answered {}", response.response_code()));
    }

    let response = client.create(rec, zone.clone()).await?;
    if response.response_code() != ResponseCode::NoError {
        return Err(anyhow!("server answered {}", response.response_code()));
    }
    Ok(())
}

/// Deletes the specific record value from the zone.
async fn delete(client: &mut Client, zone: &Name, record: &Record) -> Result<()> {
    let rec = dns_record(record)?;
    let response = client.delete_by_rdata(rec, zone.clone()).await?;
    if response.response_code() != ResponseCode::NoError {
        return Err(anyhow!("server answered {}", response.response_code()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::rr::RecordType;
    use local_dns_controller_core::{ResourceId, DEFAULT_PORT};

    fn record(hostname: &str, ip: &str) -> Record {
        Record {
            owner: ResourceId::new("app", "app-route"),
            gateway: Some(ResourceId::new("edge", "gw")),
            hostname: hostname.to_string(),
            ip: ip.parse().unwrap(),
            port: DEFAULT_PORT,
        }
    }

    #[test]
    fn the_domain_filter_gains_a_trailing_dot() {
        let ns = UnicastNameserver::new("127.0.0.1".parse().unwrap(), "k8s".to_string(), None)
            .expect("domain must parse");
        assert_eq!(ns.domain, "k8s.");
        assert_eq!(ns.server.port(), 53);
    }

    #[test]
    fn a_key_secret_must_be_base64() {
        let key = Some(("update-key".to_string(), "***not base64***".to_string()));
        assert!(
            UnicastNameserver::new("127.0.0.1".parse().unwrap(), "k8s.".to_string(), key).is_err()
        );
    }

    #[test]
    fn ipv4_records_become_a_records() {
        let rec = dns_record(&record("svc.k8s", "192.168.1.40")).unwrap();
        assert_eq!(rec.record_type(), RecordType::A);
        assert_eq!(rec.ttl(), 300);
        assert_eq!(rec.name().to_utf8(), "svc.k8s.");
    }

    #[test]
    fn ipv6_records_become_aaaa_records() {
        let rec = dns_record(&record("svc.k8s", "fd00::40")).unwrap();
        assert_eq!(rec.record_type(), RecordType::AAAA);
    }
}
