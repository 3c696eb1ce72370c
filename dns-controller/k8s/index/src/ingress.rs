use local_dns_controller_core::ResourceId;
use local_dns_controller_k8s_api as k8s;
use std::net::{IpAddr, Ipv4Addr};

/// The subset of an Ingress the registry derives records from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ingress {
    pub id: ResourceId,
    pub hostnames: Vec<String>,
    pub load_balancer_ips: Vec<IpAddr>,
}

// === impl Ingress ===

impl Ingress {
    pub fn from_resource(id: ResourceId, ingress: k8s::Ingress) -> Self {
        let hostnames = ingress
            .spec
            .into_iter()
            .flat_map(|spec| spec.rules.into_iter().flatten())
            .filter_map(|rule| rule.host)
            .collect();

        let load_balancer_ips = ingress
            .status
            .into_iter()
            .filter_map(|status| status.load_balancer)
            .flat_map(|lb| lb.ingress.into_iter().flatten())
            .filter_map(|lb| match (lb.ip, lb.hostname) {
                (Some(ip), _) => match ip.parse() {
                    Ok(ip) => Some(ip),
                    Err(_) => {
                        tracing::warn!(address = %ip, "Ignoring unparseable load balancer address");
                        None
                    }
                },
                // A hostname-only loopback load balancer still has a
                // well-known address.
                (None, Some(host)) if host == "localhost" => {
                    Some(IpAddr::V4(Ipv4Addr::LOCALHOST))
                }
                (None, Some(host)) => {
                    tracing::warn!(hostname = %host, "Ignoring hostname-only load balancer address");
                    None
                }
                (None, None) => None,
            })
            .collect();

        Self {
            id,
            hostnames,
            load_balancer_ips,
        }
    }
}
