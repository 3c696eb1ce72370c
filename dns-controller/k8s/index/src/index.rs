use crate::{gateway::Gateway, ingress::Ingress, route::Route};
use ahash::AHashMap as HashMap;
use local_dns_controller_core::{Record, RecordSet, ResourceId, DEFAULT_PORT};
use local_dns_controller_k8s_api::{self as k8s, ResourceExt};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info_span;

pub type SharedIndex = Arc<RwLock<Index>>;

/// Holds all indexing state: the watched gateways, routes, and ingresses, and
/// the record set derived from joining them. Owned and updated by the tasks
/// that process watch events; record snapshots are published to subscribed
/// nameservers after every mutation.
#[derive(Debug)]
pub struct Index {
    gateways: HashMap<ResourceId, Gateway>,
    routes: HashMap<ResourceId, Route>,
    ingresses: HashMap<ResourceId, Ingress>,

    records: RecordSet,
    snapshot: watch::Sender<RecordSet>,
}

// === impl Index ===

impl Index {
    pub fn shared() -> SharedIndex {
        let (snapshot, _) = watch::channel(RecordSet::new());
        Arc::new(RwLock::new(Self {
            gateways: HashMap::default(),
            routes: HashMap::default(),
            ingresses: HashMap::default(),
            records: RecordSet::new(),
            snapshot,
        }))
    }

    /// Obtains a receiver of record snapshots. The receiver immediately holds
    /// the current snapshot and observes the freshest one thereafter;
    /// intermediate snapshots may be coalesced.
    pub fn subscribe(&self) -> watch::Receiver<RecordSet> {
        self.snapshot.subscribe()
    }

    /// Returns the current record set, optionally restricted to fqdns ending
    /// in the given suffix.
    pub fn records(&self, suffix: Option<&str>) -> RecordSet {
        match suffix {
            None => self.records.clone(),
            Some(suffix) => self
                .records
                .iter()
                .filter(|record| record.fqdn().ends_with(suffix))
                .cloned()
                .collect(),
        }
    }

    /// Replaces the gateway with the same id and re-derives the records of
    /// every route that references it.
    pub fn upsert_gateway(&mut self, gateway: Gateway) {
        let id = gateway.id.clone();
        self.records.retain(|r| r.gateway.as_ref() != Some(&id));
        self.gateways.insert(id, gateway);

        // The record set is value-deduplicated, so re-deriving every route
        // picks up the replaced gateway's addresses without disturbing
        // records contributed through other parents.
        let derived = self
            .routes
            .values()
            .flat_map(|route| derive_route(route, &self.gateways))
            .collect::<Vec<_>>();
        self.records.extend(derived);
        self.publish();
    }

    /// Drops the gateway and purges exactly the records that carried its
    /// addresses.
    pub fn remove_gateway(&mut self, id: &ResourceId) {
        if self.gateways.remove(id).is_none() {
            tracing::warn!(gateway = %id, "Removed gateway was not known");
            return;
        }
        self.records.retain(|r| r.gateway.as_ref() != Some(id));
        self.publish();
    }

    /// Replaces the route with the same id and re-derives its records against
    /// the currently-known gateways. An upsert that shrinks the hostname list
    /// deletes the vanished records.
    pub fn upsert_route(&mut self, route: Route) {
        let id = route.id.clone();
        self.records.retain(|r| r.owner != id);
        self.records.extend(derive_route(&route, &self.gateways));
        self.routes.insert(id, route);
        self.publish();
    }

    /// Drops the route and purges exactly the records it contributed.
    pub fn remove_route(&mut self, id: &ResourceId) {
        if self.routes.remove(id).is_none() {
            tracing::warn!(route = %id, "Removed route was not known");
            return;
        }
        self.records.retain(|r| r.owner != *id);
        self.publish();
    }

    /// Replaces the ingress with the same id and re-derives its records.
    pub fn upsert_ingress(&mut self, ingress: Ingress) {
        let id = ingress.id.clone();
        self.records.retain(|r| r.owner != id);
        self.records.extend(derive_ingress(&ingress));
        self.ingresses.insert(id, ingress);
        self.publish();
    }

    /// Drops the ingress and purges exactly the records it contributed.
    pub fn remove_ingress(&mut self, id: &ResourceId) {
        if self.ingresses.remove(id).is_none() {
            tracing::warn!(ingress = %id, "Removed ingress was not known");
            return;
        }
        self.records.retain(|r| r.owner != *id);
        self.publish();
    }

    fn publish(&self) {
        let records = self.records.clone();
        self.snapshot.send_if_modified(|current| {
            if *current == records {
                return false;
            }
            *current = records;
            true
        });
    }
}

/// Derives the records an accepted route contributes: one per parent gateway
/// address and hostname, at the port resolved from the parent reference, the
/// named listener, or the default.
fn derive_route(route: &Route, gateways: &HashMap<ResourceId, Gateway>) -> Vec<Record> {
    if !route.accepted {
        tracing::debug!(route = %route.id, "Route is not accepted; contributing no records");
        return Vec::new();
    }

    let mut records = Vec::new();
    for parent in &route.parents {
        let gateway_id = route.gateway_id(parent);
        let Some(gateway) = gateways.get(&gateway_id) else {
            tracing::warn!(
                route = %route.id,
                gateway = %gateway_id,
                "Route references a gateway that is not (yet) known",
            );
            continue;
        };

        let port = parent
            .port
            .or_else(|| {
                parent
                    .section_name
                    .as_deref()
                    .and_then(|section| gateway.port_by_section_name(section))
            })
            .unwrap_or(DEFAULT_PORT);

        for hostname in &route.hostnames {
            for &ip in &gateway.addresses {
                records.push(Record {
                    owner: route.id.clone(),
                    gateway: Some(gateway_id.clone()),
                    hostname: hostname.clone(),
                    ip,
                    port,
                });
            }
        }
    }
    records
}

/// Derives the records an ingress contributes: one per hostname against its
/// first load balancer address, always on the default port.
fn derive_ingress(ingress: &Ingress) -> Vec<Record> {
    let Some(&ip) = ingress.load_balancer_ips.first() else {
        tracing::debug!(ingress = %ingress.id, "Ingress has no load balancer address; contributing no records");
        return Vec::new();
    };
    if ingress.load_balancer_ips.len() > 1 {
        tracing::warn!(ingress = %ingress.id, "Ingress reports multiple load balancer addresses; using the first");
    }

    ingress
        .hostnames
        .iter()
        .map(|hostname| Record {
            owner: ingress.id.clone(),
            gateway: None,
            hostname: hostname.clone(),
            ip,
            port: DEFAULT_PORT,
        })
        .collect()
}

fn resource_id(resource: &impl ResourceExt) -> Option<ResourceId> {
    let namespace = resource.namespace()?;
    let name = resource.meta().name.clone()?;
    Some(ResourceId::new(namespace, name))
}

impl kubert::index::IndexNamespacedResource<k8s::gateway::Gateway> for Index {
    fn apply(&mut self, gateway: k8s::gateway::Gateway) {
        let Some(id) = resource_id(&gateway) else {
            tracing::warn!("Ignoring Gateway event for an unidentifiable resource");
            return;
        };
        let _span = info_span!("apply", gateway = %id).entered();
        self.upsert_gateway(Gateway::from_resource(id, gateway));
    }

    fn delete(&mut self, ns: String, name: String) {
        let id = ResourceId::new(ns, name);
        let _span = info_span!("delete", gateway = %id).entered();
        self.remove_gateway(&id);
    }

    // Every apply re-derives from the indexed maps, so there's no need to
    // handle resets specially.
}

impl kubert::index::IndexNamespacedResource<k8s::gateway::HttpRoute> for Index {
    fn apply(&mut self, route: k8s::gateway::HttpRoute) {
        let Some(id) = resource_id(&route) else {
            tracing::warn!("Ignoring HTTPRoute event for an unidentifiable resource");
            return;
        };
        let _span = info_span!("apply", route = %id).entered();
        match Route::from_resource(id, route) {
            Ok(route) => self.upsert_route(route),
            Err(error) => tracing::warn!(%error, "Skipping HTTPRoute event"),
        }
    }

    fn delete(&mut self, ns: String, name: String) {
        let id = ResourceId::new(ns, name);
        let _span = info_span!("delete", route = %id).entered();
        self.remove_route(&id);
    }
}

impl kubert::index::IndexNamespacedResource<k8s::Ingress> for Index {
    fn apply(&mut self, ingress: k8s::Ingress) {
        let Some(id) = resource_id(&ingress) else {
            tracing::warn!("Ignoring Ingress event for an unidentifiable resource");
            return;
        };
        let _span = info_span!("apply", ingress = %id).entered();
        self.upsert_ingress(Ingress::from_resource(id, ingress));
    }

    fn delete(&mut self, ns: String, name: String) {
        let id = ResourceId::new(ns, name);
        let _span = info_span!("delete", ingress = %id).entered();
        self.remove_ingress(&id);
    }
}
