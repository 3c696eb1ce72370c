use local_dns_controller_core::ResourceId;
use local_dns_controller_k8s_api::gateway as api;
use std::{net::IpAddr, num::NonZeroU16};

/// The subset of a Gateway the registry joins against: its listeners and the
/// IP addresses reported in its status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gateway {
    pub id: ResourceId,
    pub listeners: Vec<Listener>,
    pub addresses: Vec<IpAddr>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Listener {
    pub name: String,
    pub port: Option<NonZeroU16>,
    pub protocol: String,
}

// === impl Gateway ===

impl Gateway {
    pub fn from_resource(id: ResourceId, gateway: api::Gateway) -> Self {
        let listeners = gateway
            .spec
            .listeners
            .into_iter()
            .map(|listener| Listener {
                name: listener.name,
                port: NonZeroU16::new(listener.port),
                protocol: listener.protocol,
            })
            .collect();

        // Only status addresses reported as IP addresses are usable; an
        // absent type defaults to `IPAddress` on the API.
        let addresses = gateway
            .status
            .into_iter()
            .flat_map(|status| status.addresses.into_iter().flatten())
            .filter(|addr| addr.r#type.as_deref().unwrap_or("IPAddress") == "IPAddress")
            .filter_map(|addr| match addr.value.parse() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    tracing::warn!(address = %addr.value, "Ignoring unparseable gateway address");
                    None
                }
            })
            .collect();

        Self {
            id,
            listeners,
            addresses,
        }
    }

    /// Returns the port of the listener matching the given section name.
    pub fn port_by_section_name(&self, section_name: &str) -> Option<NonZeroU16> {
        self.listeners
            .iter()
            .find(|listener| listener.name == section_name)
            .and_then(|listener| listener.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use local_dns_controller_k8s_api::ObjectMeta;

    fn mk_gateway(addresses: Vec<api::GatewayAddress>) -> api::Gateway {
        api::Gateway {
            metadata: ObjectMeta {
                namespace: Some("edge".to_string()),
                name: Some("gw".to_string()),
                ..Default::default()
            },
            spec: api::GatewaySpec {
                gateway_class_name: "test".to_string(),
                listeners: vec![
                    api::Listener {
                        name: "http".to_string(),
                        hostname: None,
                        port: 80,
                        protocol: "HTTP".to_string(),
                        tls: None,
                        allowed_routes: None,
                    },
                    api::Listener {
                        name: "https".to_string(),
                        hostname: None,
                        port: 443,
                        protocol: "HTTPS".to_string(),
                        tls: None,
                        allowed_routes: None,
                    },
                ],
                addresses: None,
            },
            status: Some(api::GatewayStatus {
                addresses: Some(addresses),
                conditions: None,
                listeners: None,
            }),
        }
    }

    fn addr(ty: Option<&str>, value: &str) -> api::GatewayAddress {
        api::GatewayAddress {
            r#type: ty.map(ToString::to_string),
            value: value.to_string(),
        }
    }

    #[test]
    fn listeners_resolve_by_section_name() {
        let gw = Gateway::from_resource(
            ResourceId::new("edge", "gw"),
            mk_gateway(vec![addr(Some("IPAddress"), "172.18.0.2")]),
        );
        assert_eq!(gw.port_by_section_name("https").map(NonZeroU16::get), Some(443));
        assert_eq!(gw.port_by_section_name("tcp"), None);
    }

    #[test]
    fn only_ip_addresses_are_kept() {
        let gw = Gateway::from_resource(
            ResourceId::new("edge", "gw"),
            mk_gateway(vec![
                addr(Some("IPAddress"), "172.18.0.2"),
                addr(Some("Hostname"), "lb.example.com"),
                addr(Some("IPAddress"), "not-an-ip"),
                addr(None, "172.18.0.3"),
            ]),
        );
        assert_eq!(
            gw.addresses,
            vec![
                "172.18.0.2".parse::<IpAddr>().unwrap(),
                "172.18.0.3".parse::<IpAddr>().unwrap(),
            ],
        );
    }

    #[test]
    fn a_gateway_without_status_has_no_addresses() {
        let mut resource = mk_gateway(vec![]);
        resource.status = None;
        let gw = Gateway::from_resource(ResourceId::new("edge", "gw"), resource);
        assert!(gw.addresses.is_empty());
    }
}
