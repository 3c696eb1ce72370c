use local_dns_controller_core::ResourceId;
use local_dns_controller_k8s_api::gateway as api;
use std::num::NonZeroU16;

/// The subset of an HTTPRoute the registry derives records from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub id: ResourceId,
    pub hostnames: Vec<String>,
    pub parents: Vec<ParentRef>,

    /// Whether every reported parent accepted the route. A route that is not
    /// accepted contributes no records.
    pub accepted: bool,
}

/// A parent gateway reference, as written on the route's spec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParentRef {
    pub namespace: Option<String>,
    pub name: String,
    pub section_name: Option<String>,
    pub port: Option<NonZeroU16>,
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum InvalidRoute {
    #[error("HTTPRoute has no status")]
    MissingStatus,

    #[error("HTTPRoute status reports no parents")]
    MissingParents,
}

// === impl Route ===

impl Route {
    pub fn from_resource(id: ResourceId, route: api::HttpRoute) -> Result<Self, InvalidRoute> {
        let status = route.status.ok_or(InvalidRoute::MissingStatus)?;
        if status.inner.parents.is_empty() {
            return Err(InvalidRoute::MissingParents);
        }

        let accepted = status.inner.parents.iter().all(|parent| {
            parent
                .conditions
                .iter()
                .any(|c| c.type_ == "Accepted" && c.status == "True")
        });

        let hostnames = route.spec.hostnames.into_iter().flatten().collect();

        let parents = route
            .spec
            .inner
            .parent_refs
            .into_iter()
            .flatten()
            .filter(|parent| parent.kind.as_deref().unwrap_or("Gateway") == "Gateway")
            .map(|parent| ParentRef {
                namespace: parent.namespace,
                name: parent.name,
                section_name: parent.section_name,
                port: parent.port.and_then(NonZeroU16::new),
            })
            .collect();

        Ok(Self {
            id,
            hostnames,
            parents,
            accepted,
        })
    }

    /// Resolves a parent reference against the route's own namespace.
    pub fn gateway_id(&self, parent: &ParentRef) -> ResourceId {
        let namespace = parent.namespace.as_deref().unwrap_or(&self.id.namespace);
        ResourceId::new(namespace, &parent.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use local_dns_controller_k8s_api::{self as k8s, ObjectMeta};

    fn mk_parent(name: &str, kind: Option<&str>) -> api::ParentReference {
        api::ParentReference {
            group: Some("gateway.networking.k8s.io".to_string()),
            kind: kind.map(ToString::to_string),
            namespace: None,
            name: name.to_string(),
            section_name: None,
            port: None,
        }
    }

    fn mk_condition(type_: &str, status: &str) -> k8s::Condition {
        k8s::Condition {
            last_transition_time: k8s::Time(chrono::Utc::now()),
            message: String::new(),
            observed_generation: None,
            reason: type_.to_string(),
            status: status.to_string(),
            type_: type_.to_string(),
        }
    }

    fn mk_route(
        parents: Vec<api::ParentReference>,
        parent_conditions: Vec<Vec<k8s::Condition>>,
    ) -> api::HttpRoute {
        let parent_statuses = parents
            .iter()
            .cloned()
            .zip(parent_conditions)
            .map(|(parent_ref, conditions)| api::RouteParentStatus {
                parent_ref,
                controller_name: "dns.local/controller".to_string(),
                conditions,
            })
            .collect();
        api::HttpRoute {
            metadata: ObjectMeta {
                namespace: Some("app".to_string()),
                name: Some("app-route".to_string()),
                ..Default::default()
            },
            spec: api::HttpRouteSpec {
                inner: api::CommonRouteSpec {
                    parent_refs: Some(parents),
                },
                hostnames: Some(vec!["app.local".to_string()]),
                rules: None,
            },
            status: Some(api::HttpRouteStatus {
                inner: api::RouteStatus {
                    parents: parent_statuses,
                },
            }),
        }
    }

    #[test]
    fn a_route_without_status_is_invalid() {
        let mut resource = mk_route(vec![mk_parent("gw", Some("Gateway"))], vec![vec![]]);
        resource.status = None;
        assert!(matches!(
            Route::from_resource(ResourceId::new("app", "app-route"), resource),
            Err(InvalidRoute::MissingStatus),
        ));
    }

    #[test]
    fn a_route_without_reported_parents_is_invalid() {
        let mut resource = mk_route(vec![mk_parent("gw", Some("Gateway"))], vec![vec![]]);
        resource.status = Some(api::HttpRouteStatus {
            inner: api::RouteStatus { parents: vec![] },
        });
        assert!(matches!(
            Route::from_resource(ResourceId::new("app", "app-route"), resource),
            Err(InvalidRoute::MissingParents),
        ));
    }

    #[test]
    fn acceptance_requires_every_parent_to_accept() {
        let parents = vec![mk_parent("gw", Some("Gateway")), mk_parent("gw-b", None)];

        let resource = mk_route(
            parents.clone(),
            vec![
                vec![mk_condition("Accepted", "True")],
                vec![mk_condition("Accepted", "True")],
            ],
        );
        let route = Route::from_resource(ResourceId::new("app", "app-route"), resource)
            .expect("route must parse");
        assert!(route.accepted);
        assert_eq!(route.parents.len(), 2);

        let resource = mk_route(
            parents.clone(),
            vec![
                vec![mk_condition("Accepted", "True")],
                vec![mk_condition("Accepted", "False")],
            ],
        );
        let route = Route::from_resource(ResourceId::new("app", "app-route"), resource)
            .expect("route must parse");
        assert!(!route.accepted);

        // A parent that reports no Accepted condition at all does not accept.
        let resource = mk_route(
            parents,
            vec![
                vec![mk_condition("Accepted", "True")],
                vec![mk_condition("ResolvedRefs", "True")],
            ],
        );
        let route = Route::from_resource(ResourceId::new("app", "app-route"), resource)
            .expect("route must parse");
        assert!(!route.accepted);
    }

    #[test]
    fn parent_refs_to_other_kinds_are_ignored() {
        let resource = mk_route(
            vec![mk_parent("gw", Some("Gateway")), mk_parent("svc", Some("Service"))],
            vec![
                vec![mk_condition("Accepted", "True")],
                vec![mk_condition("Accepted", "True")],
            ],
        );
        let route = Route::from_resource(ResourceId::new("app", "app-route"), resource)
            .expect("route must parse");
        assert_eq!(route.parents.len(), 1);
        assert_eq!(route.parents[0].name, "gw");
    }
}
