use anyhow::{bail, Result};
use clap::Parser;
use local_dns_controller_k8s_api::{self as k8s, watcher, Client, Resource};
use local_dns_controller_k8s_index::Index;
use local_dns_controller_nameservers::{MulticastNameserver, UnicastNameserver};
use std::net::IpAddr;
use tracing::{info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "local-dns-controller",
    about = "Publishes cluster-exposed hostnames into local DNS"
)]
pub struct Args {
    #[clap(long, default_value = "info", env = "LOCAL_DNS_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Advertise `.local` names over multicast DNS.
    #[clap(long, env = "LOCAL_DNS_MULTICAST_ENABLE")]
    multicast_enable: bool,

    /// Publish names with dynamic DNS updates to an authoritative server.
    #[clap(long, env = "LOCAL_DNS_UNICAST_ENABLE")]
    unicast_enable: bool,

    /// Address of the authoritative DNS server to update.
    #[clap(long, default_value = "127.0.0.1", env = "LOCAL_DNS_UNICAST_IP")]
    unicast_ip: IpAddr,

    /// Publish only names ending in this domain.
    #[clap(long, env = "LOCAL_DNS_UNICAST_DOMAIN")]
    unicast_domain: Option<String>,

    /// TSIG key name used to sign updates.
    #[clap(long, default_value = "", env = "LOCAL_DNS_UNICAST_KEY_NAME")]
    unicast_key_name: String,

    /// Base64-encoded TSIG key secret.
    #[clap(long, default_value = "", env = "LOCAL_DNS_UNICAST_KEY_SECRET")]
    unicast_key_secret: String,
}

// === impl Args ===

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            multicast_enable,
            unicast_enable,
            unicast_ip,
            unicast_domain,
            unicast_key_name,
            unicast_key_secret,
        } = self;

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_admin(admin.into_builder())
            .with_client(client)
            .build()
            .await?;

        // Construct the enabled nameservers up front so a misconfiguration
        // or an unbindable multicast endpoint fails startup.
        let multicast = if multicast_enable {
            Some(MulticastNameserver::new()?)
        } else {
            None
        };
        let unicast = if unicast_enable {
            let Some(domain) = unicast_domain else {
                bail!("--unicast-domain is required when --unicast-enable is set");
            };
            let key = match (unicast_key_name.is_empty(), unicast_key_secret.is_empty()) {
                (true, true) => None,
                (false, false) => Some((unicast_key_name, unicast_key_secret)),
                _ => bail!("--unicast-key-name and --unicast-key-secret must be set together"),
            };
            Some(UnicastNameserver::new(unicast_ip, domain, key)?)
        } else {
            None
        };
        if multicast.is_none() && unicast.is_none() {
            tracing::warn!("No nameservers are enabled; record changes will only be logged");
        }

        let index = Index::shared();

        // Spawn resource watches. The Gateway API kinds are optional: when
        // the CRDs are not installed, their watchers stay dormant.
        if api_resource_exists::<k8s::gateway::Gateway>(&runtime.client()).await {
            let gateways = runtime.watch_all::<k8s::gateway::Gateway>(watcher::Config::default());
            tokio::spawn(
                kubert::index::namespaced(index.clone(), gateways)
                    .instrument(info_span!("gateways")),
            );
        } else {
            tracing::warn!("gateways.gateway.networking.k8s.io resource kind not found, skipping watches");
        }

        if api_resource_exists::<k8s::gateway::HttpRoute>(&runtime.client()).await {
            let routes = runtime.watch_all::<k8s::gateway::HttpRoute>(watcher::Config::default());
            tokio::spawn(
                kubert::index::namespaced(index.clone(), routes)
                    .instrument(info_span!("httproutes")),
            );
        } else {
            tracing::warn!("httproutes.gateway.networking.k8s.io resource kind not found, skipping watches");
        }

        let ingresses = runtime.watch_all::<k8s::Ingress>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), ingresses).instrument(info_span!("ingresses")),
        );

        // Run the nameservers against the index's snapshot stream.
        if let Some(multicast) = multicast {
            let snapshots = index.read().subscribe();
            tokio::spawn(
                multicast
                    .run(snapshots, runtime.shutdown_handle())
                    .instrument(info_span!("multicast")),
            );
        }
        if let Some(unicast) = unicast {
            let snapshots = index.read().subscribe();
            tokio::spawn(
                unicast
                    .run(snapshots, runtime.shutdown_handle())
                    .instrument(info_span!("unicast")),
            );
        }

        // Block the main task on the shutdown signal; nameservers drain their
        // registrations before the process exits.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }
        Ok(())
    }
}

async fn api_resource_exists<T>(client: &Client) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    match client.list_api_group_resources(&T::api_version(&dt)).await {
        Ok(resources) => resources.resources.iter().any(|r| r.kind == T::kind(&dt)),
        // A missing API group reads the same as a missing kind.
        Err(_) => false,
    }
}
