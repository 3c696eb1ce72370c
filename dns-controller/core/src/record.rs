use crate::ResourceId;
use std::{collections::BTreeSet, fmt, net::IpAddr, num::NonZeroU16};

/// The port assumed when neither a parent reference nor a listener names one.
pub const DEFAULT_PORT: NonZeroU16 = match NonZeroU16::new(80) {
    Some(port) => port,
    None => panic!("80 is non-zero"),
};

/// The unit of DNS publication: a hostname, address, and port tagged with the
/// route or ingress that produced it and the gateway that carried the address.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Record {
    pub owner: ResourceId,

    /// `None` for ingress-derived records, which carry no gateway.
    pub gateway: Option<ResourceId>,

    /// The hostname as it was written on the resource; it may or may not end
    /// in a dot.
    pub hostname: String,

    pub ip: IpAddr,
    pub port: NonZeroU16,
}

/// A full snapshot of the registry's records, as delivered to subscribers.
pub type RecordSet = BTreeSet<Record>;

/// The identity publishers key their published state on.
///
/// The port is payload: a record whose key matches a published one but whose
/// port differs is a modification of an existing name, not a new name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub owner: ResourceId,
    pub gateway: Option<ResourceId>,
    pub hostname: String,
    pub ip: IpAddr,
}

// === impl Record ===

impl Record {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            owner: self.owner.clone(),
            gateway: self.gateway.clone(),
            hostname: self.hostname.clone(),
            ip: self.ip,
        }
    }

    /// The hostname with its trailing dot enforced.
    pub fn fqdn(&self) -> String {
        if self.hostname.ends_with('.') {
            self.hostname.clone()
        } else {
            format!("{}.", self.hostname)
        }
    }

    /// The last label of the hostname.
    pub fn domain(&self) -> &str {
        let host = self.hostname.trim_end_matches('.');
        host.rsplit('.').next().unwrap_or(host)
    }

    /// The hostname with its trailing domain label removed.
    pub fn unqualified(&self) -> &str {
        let host = self.hostname.trim_end_matches('.');
        match host.rsplit_once('.') {
            Some((rest, _)) => rest,
            None => host,
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}", self.fqdn(), self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hostname: &str) -> Record {
        Record {
            owner: ResourceId::new("app", "app-route"),
            gateway: Some(ResourceId::new("edge", "gw")),
            hostname: hostname.to_string(),
            ip: "172.18.0.2".parse().unwrap(),
            port: DEFAULT_PORT,
        }
    }

    #[test]
    fn fqdn_appends_a_trailing_dot_once() {
        assert_eq!(record("app.local").fqdn(), "app.local.");
        assert_eq!(record("app.local.").fqdn(), "app.local.");
    }

    #[test]
    fn domain_is_the_last_label() {
        assert_eq!(record("app.local").domain(), "local");
        assert_eq!(record("svc.cluster.k8s.").domain(), "k8s");
    }

    #[test]
    fn unqualified_strips_the_domain_label() {
        assert_eq!(record("app.local").unqualified(), "app");
        assert_eq!(record("svc.cluster.k8s.").unqualified(), "svc.cluster");
        assert_eq!(record("bare").unqualified(), "bare");
    }

    #[test]
    fn key_ignores_the_port() {
        let mut changed = record("app.local");
        changed.port = NonZeroU16::new(8080).unwrap();
        assert_eq!(record("app.local").key(), changed.key());
    }
}
