#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Re-exports the subset of the Kubernetes API surface the controller
//! consumes.

pub use k8s_gateway_api as gateway;
pub use k8s_openapi::{
    api::networking::v1::{
        Ingress, IngressLoadBalancerIngress, IngressLoadBalancerStatus, IngressRule, IngressSpec,
        IngressStatus,
    },
    apimachinery::pkg::apis::meta::v1::{Condition, Time},
};
pub use kube::{
    api::{Api, ObjectMeta, Resource, ResourceExt},
    runtime::watcher,
    Client,
};
