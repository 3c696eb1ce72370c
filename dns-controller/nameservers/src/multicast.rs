use crate::diff::{diff, domain_filter, Changes};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use anyhow::Result;
use local_dns_controller_core::{Record, RecordKey, RecordSet};
use mdns_sd::{ServiceDaemon, ServiceInfo};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// The DNS-SD service type every advertisement is published under.
const SERVICE_TYPE: &str = "_http._tcp.local.";

/// Suffix of the names this nameserver is responsible for.
const LOCAL_DOMAIN: &str = ".local.";

/// Advertises `.local` names over multicast DNS.
pub struct MulticastNameserver {
    daemon: ServiceDaemon,
    published: HashMap<RecordKey, Record>,

    /// Service instance names currently claimed. A name is won by whichever
    /// record registered it first.
    names: HashSet<String>,
}

// === impl MulticastNameserver ===

impl MulticastNameserver {
    /// Binds the multicast responder. Failing to open the endpoint is a
    /// startup error.
    pub fn new() -> Result<Self> {
        let daemon = ServiceDaemon::new()?;
        Ok(Self {
            daemon,
            published: HashMap::default(),
            names: HashSet::default(),
        })
    }

    /// Reconciles every snapshot until the registry goes away or shutdown is
    /// signaled, then unregisters all advertisements.
    pub async fn run(mut self, mut snapshots: watch::Receiver<RecordSet>, drain: drain::Watch) {
        let shutdown = drain.signaled();
        tokio::pin!(shutdown);

        loop {
            let snapshot = snapshots.borrow_and_update().clone();
            self.reconcile(&snapshot);

            tokio::select! {
                res = snapshots.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
                handle = &mut shutdown => {
                    self.shutdown();
                    drop(handle);
                    return;
                }
            }
        }
        self.shutdown();
    }

    fn reconcile(&mut self, snapshot: &RecordSet) {
        let desired = domain_filter(snapshot, LOCAL_DOMAIN);
        let Changes {
            remove,
            add,
            modify,
        } = diff(&self.published, &desired);

        for record in remove {
            self.unregister(&record);
        }
        for record in add {
            self.register(record);
        }
        for record in modify {
            self.reregister(record);
        }
    }

    fn register(&mut self, record: Record) {
        let fullname = service_fullname(&record);
        if self.names.contains(&fullname) {
            warn!(
                owner = %record.owner,
                fqdn = %record.fqdn(),
                "Service name is already registered; skipping",
            );
            return;
        }

        let Some(info) = self.service_info(&record) else {
            return;
        };
        if let Err(error) = self.daemon.register(info) {
            warn!(owner = %record.owner, fqdn = %record.fqdn(), %error, "Failed to register service");
            return;
        }

        info!(
            owner = %record.owner,
            fqdn = %record.fqdn(),
            ip = %record.ip,
            port = %record.port,
            "Registered service",
        );
        self.names.insert(fullname);
        self.published.insert(record.key(), record);
    }

    fn unregister(&mut self, record: &Record) {
        let fullname = service_fullname(record);
        match self.daemon.unregister(&fullname) {
            Ok(_) => info!(owner = %record.owner, fqdn = %record.fqdn(), "Unregistered service"),
            Err(error) => {
                warn!(owner = %record.owner, fqdn = %record.fqdn(), %error, "Failed to unregister service")
            }
        }
        self.names.remove(&fullname);
        self.published.remove(&record.key());
    }

    /// Re-registering an instance updates its advertised port.
    fn reregister(&mut self, record: Record) {
        let Some(info) = self.service_info(&record) else {
            return;
        };
        if let Err(error) = self.daemon.register(info) {
            warn!(owner = %record.owner, fqdn = %record.fqdn(), %error, "Failed to update service");
            return;
        }
        info!(
            owner = %record.owner,
            fqdn = %record.fqdn(),
            port = %record.port,
            "Updated service",
        );
        self.published.insert(record.key(), record);
    }

    fn service_info(&self, record: &Record) -> Option<ServiceInfo> {
        match ServiceInfo::new(
            SERVICE_TYPE,
            record.unqualified(),
            &record.fqdn(),
            record.ip,
            record.port.get(),
            std::collections::HashMap::<String, String>::new(),
        ) {
            Ok(info) => Some(info),
            Err(error) => {
                warn!(
                    owner = %record.owner,
                    fqdn = %record.fqdn(),
                    %error,
                    "Record does not form a valid service name; skipping",
                );
                None
            }
        }
    }

    fn shutdown(self) {
        for record in self.published.values() {
            if let Err(error) = self.daemon.unregister(&service_fullname(record)) {
                debug!(fqdn = %record.fqdn(), %error, "Failed to unregister service");
            }
        }
        if let Err(error) = self.daemon.shutdown() {
            warn!(%error, "Failed to shut down the multicast responder");
        }
    }
}

/// The full instance name a record is advertised under.
fn service_fullname(record: &Record) -> String {
    format!("{}.{}", record.unqualified(), SERVICE_TYPE)
}

#[cfg(test)]
mod tests {
    use super::service_fullname;
    use local_dns_controller_core::{Record, ResourceId, DEFAULT_PORT};

    #[test]
    fn instance_names_derive_from_the_unqualified_host() {
        let record = Record {
            owner: ResourceId::new("app", "app-route"),
            gateway: Some(ResourceId::new("edge", "gw")),
            hostname: "app.local".to_string(),
            ip: "172.18.0.2".parse().unwrap(),
            port: DEFAULT_PORT,
        };
        assert_eq!(service_fullname(&record), "app._http._tcp.local.");
    }
}
