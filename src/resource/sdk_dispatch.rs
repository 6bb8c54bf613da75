//! SDK Dispatch
//!
//! Maps table method names to Rackspace API calls.

use super::fetcher::{container_metadata, get_by_key, get_container};
use super::model::{
    Container, DnsDomain, KeyPairEntry, Limits, LoadBalancer, Object, Queue, ResourceItem,
};
use super::pager::{for_each_page, LinkPager, MarkerPager, NextLink, PageSource, Pages};
use super::registry::TableDef;
use super::row::to_row;
use crate::context::QueryContext;
use crate::error::{Error, Result};
use crate::plugin::{Query, RowSink};
use crate::rackspace::client::{Connection, RestService, ServiceClient, ServiceKind};
use crate::rackspace::http::Body;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;

/// Per-row hydration calls in flight at once
const HYDRATE_CONCURRENCY: usize = 8;

/// Invoke the list method of a table, streaming rows into `sink`
pub async fn invoke_list(conn: &Connection, table: &'static TableDef, query: &Query, sink: &RowSink) -> Result<()> {
    tracing::debug!("invoke_list: table={}, method={}", table.name, table.list.method);

    let out = &Emitter { table, query, sink };
    match table.list.method.as_str() {
        "list_servers" => SERVERS.list(conn, out, ResourceItem::Server).await,
        "list_flavors" => FLAVORS.list(conn, out, ResourceItem::Flavor).await,
        "list_keypairs" => {
            KEYPAIRS
                .list(conn, out, |entry: KeyPairEntry| ResourceItem::KeyPair(entry.keypair))
                .await
        }
        "get_limits" => get_limits(conn, out).await,
        "list_images" => IMAGES.list(conn, out, ResourceItem::Image).await,
        "list_volumes" => VOLUMES.list(conn, out, ResourceItem::Volume).await,
        "list_snapshots" => SNAPSHOTS.list(conn, out, ResourceItem::Snapshot).await,
        "list_networks" => NETWORKS.list(conn, out, ResourceItem::Network).await,
        "list_ports" => PORTS.list(conn, out, ResourceItem::Port).await,
        "list_subnets" => SUBNETS.list(conn, out, ResourceItem::Subnet).await,
        "list_security_groups" => SECURITY_GROUPS.list(conn, out, ResourceItem::SecurityGroup).await,
        "list_load_balancers" => LOAD_BALANCERS.list(conn, out, ResourceItem::LoadBalancer).await,
        "list_queues" => list_queues(conn, out).await,
        "list_dns_domains" => list_dns_domains(conn, out).await,
        "list_containers" => list_containers(conn, out).await,
        "list_objects" => list_objects(conn, out).await,
        other => Err(Error::UnknownTable(format!("{} (list method {})", table.name, other))),
    }
}

/// Invoke the get method of a table for one key
pub async fn invoke_get(conn: &Connection, table: &'static TableDef, query: &Query, key: &str) -> Result<ResourceItem> {
    let method = table.get.as_ref().map(|g| g.method.as_str()).unwrap_or_default();
    tracing::debug!("invoke_get: table={}, method={}, key={}", table.name, method, key);

    let ctx = &query.ctx;
    match method {
        "get_server" => GET_SERVER.fetch(conn, ctx, key).await.map(ResourceItem::Server),
        "get_flavor" => GET_FLAVOR.fetch(conn, ctx, key).await.map(ResourceItem::Flavor),
        "get_keypair" => GET_KEYPAIR.fetch(conn, ctx, key).await.map(ResourceItem::KeyPair),
        "get_image" => GET_IMAGE.fetch(conn, ctx, key).await.map(ResourceItem::Image),
        "get_volume" => GET_VOLUME.fetch(conn, ctx, key).await.map(ResourceItem::Volume),
        "get_snapshot" => GET_SNAPSHOT.fetch(conn, ctx, key).await.map(ResourceItem::Snapshot),
        "get_load_balancer" => {
            let client = GET_LOAD_BALANCER.endpoint.client(conn, ctx).await?;
            let id = load_balancer_id(key)?;
            GET_LOAD_BALANCER
                .fetch_with::<LoadBalancer>(&client, ctx, &id.to_string())
                .await
                .map(ResourceItem::LoadBalancer)
        }
        "get_container" => {
            let client = conn.service_client(ctx, ServiceKind::ObjectStore).await?;
            get_container(&client, ctx, key, conn.config().page_size())
                .await
                .map(ResourceItem::Container)
        }
        other => Err(Error::UnknownTable(format!("{} (get method {})", table.name, other))),
    }
}

/// Projects items into rows and hands them to the sink
struct Emitter<'a> {
    table: &'static TableDef,
    query: &'a Query,
    sink: &'a RowSink,
}

impl Emitter<'_> {
    fn ctx(&self) -> &QueryContext {
        &self.query.ctx
    }

    fn wants(&self, hydrate: &str) -> bool {
        self.query.wants(self.table, hydrate)
    }

    /// Returns `false` once the host stopped reading
    async fn emit(&self, item: ResourceItem) -> Result<bool> {
        let document = item.to_document()?;
        Ok(self.sink.send(to_row(self.table, &document, &self.query.quals)).await)
    }
}

fn encode(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

#[derive(Debug, Clone, Copy)]
enum Endpoint {
    /// Routed through the identity service catalog
    Catalog(ServiceKind),
    /// Built from the configured token, tenant and region
    Rest(RestService),
}

impl Endpoint {
    async fn client(self, conn: &Connection, ctx: &QueryContext) -> Result<ServiceClient> {
        match self {
            Endpoint::Catalog(kind) => conn.service_client(ctx, kind).await,
            Endpoint::Rest(service) => conn.rest_client(service),
        }
    }
}

/// A link-paginated collection
struct Listing {
    endpoint: Endpoint,
    path: &'static str,
    collection: &'static str,
    next: NextLink,
    operation: &'static str,
}

impl Listing {
    async fn pager<T>(&self, conn: &Connection, ctx: &QueryContext) -> Result<(ServiceClient, LinkPager<T>)> {
        let client = self.endpoint.client(conn, ctx).await?;
        let pager = LinkPager::new(client.clone(), self.path, self.collection, self.next, self.operation)?;
        Ok((client, pager))
    }

    async fn list<T, F>(&self, conn: &Connection, out: &Emitter<'_>, wrap: F) -> Result<()>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T) -> ResourceItem,
    {
        let (_, pager) = self.pager::<T>(conn, out.ctx()).await?;
        for_each_page(out.ctx(), &pager, |item| out.emit(wrap(item))).await
    }
}

/// A direct `GET {path}/{key}`
struct Lookup {
    endpoint: Endpoint,
    path: &'static str,
    envelope: Option<&'static str>,
    kind: &'static str,
    operation: &'static str,
}

impl Lookup {
    async fn fetch<T: DeserializeOwned>(&self, conn: &Connection, ctx: &QueryContext, key: &str) -> Result<T> {
        let client = self.endpoint.client(conn, ctx).await?;
        self.fetch_with(&client, ctx, key).await
    }

    async fn fetch_with<T: DeserializeOwned>(&self, client: &ServiceClient, ctx: &QueryContext, key: &str) -> Result<T> {
        let path = format!("{}/{}", self.path, encode(key));
        get_by_key(client, ctx, self.operation, self.kind, key, &path, self.envelope).await
    }
}

/// Visit every item, running `hydrate` over each page with bounded
/// concurrency. Items keep their listing order.
async fn for_each_hydrated<P, H, Fut>(
    out: &Emitter<'_>,
    source: &P,
    hydrate: H,
    wrap: fn(P::Item) -> ResourceItem,
) -> Result<()>
where
    P: PageSource,
    H: Fn(P::Item) -> Fut,
    Fut: Future<Output = Result<P::Item>>,
{
    let mut pages = Pages::new(source);
    while let Some(items) = pages.next_page(out.ctx()).await? {
        let hydrated: Vec<P::Item> = stream::iter(items)
            .map(&hydrate)
            .buffered(HYDRATE_CONCURRENCY)
            .try_collect()
            .await?;

        for item in hydrated {
            if !out.emit(wrap(item)).await? {
                return Ok(());
            }
        }
    }
    Ok(())
}

// =============================================================================
// Cloud Servers
// =============================================================================

const SERVERS: Listing = Listing {
    endpoint: Endpoint::Catalog(ServiceKind::Compute),
    path: "servers/detail",
    collection: "servers",
    next: NextLink::Links("servers_links"),
    operation: "list servers",
};

const FLAVORS: Listing = Listing {
    endpoint: Endpoint::Catalog(ServiceKind::Compute),
    path: "flavors/detail",
    collection: "flavors",
    next: NextLink::Links("flavors_links"),
    operation: "list flavors",
};

const KEYPAIRS: Listing = Listing {
    endpoint: Endpoint::Catalog(ServiceKind::Compute),
    path: "os-keypairs",
    collection: "keypairs",
    next: NextLink::None,
    operation: "list keypairs",
};

const GET_SERVER: Lookup = Lookup {
    endpoint: Endpoint::Catalog(ServiceKind::Compute),
    path: "servers",
    envelope: Some("server"),
    kind: "server",
    operation: "get server",
};

const GET_FLAVOR: Lookup = Lookup {
    endpoint: Endpoint::Catalog(ServiceKind::Compute),
    path: "flavors",
    envelope: Some("flavor"),
    kind: "flavor",
    operation: "get flavor",
};

const GET_KEYPAIR: Lookup = Lookup {
    endpoint: Endpoint::Catalog(ServiceKind::Compute),
    path: "os-keypairs",
    envelope: Some("keypair"),
    kind: "keypair",
    operation: "get keypair",
};

/// Absolute limits come back as one document, streamed as a single row
async fn get_limits(conn: &Connection, out: &Emitter<'_>) -> Result<()> {
    let ctx = out.ctx();
    let client = conn.service_client(ctx, ServiceKind::Compute).await?;
    match get_by_key::<Limits>(&client, ctx, "get limits", "limits", "", "limits", Some("limits")).await {
        Ok(limits) => {
            out.emit(ResourceItem::Limits(limits)).await?;
            Ok(())
        }
        // No limits document is an empty table, not a failure
        Err(e) if e.is_not_found() => {
            tracing::debug!("get limits: {}", e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

// =============================================================================
// Cloud Images
// =============================================================================

const IMAGES: Listing = Listing {
    endpoint: Endpoint::Catalog(ServiceKind::Image),
    path: "images",
    collection: "images",
    next: NextLink::Field("next"),
    operation: "list images",
};

// Images v2 answers a single image without an envelope
const GET_IMAGE: Lookup = Lookup {
    endpoint: Endpoint::Catalog(ServiceKind::Image),
    path: "images",
    envelope: None,
    kind: "image",
    operation: "get image",
};

// =============================================================================
// Cloud Block Storage
// =============================================================================

const VOLUMES: Listing = Listing {
    endpoint: Endpoint::Rest(RestService::BlockStorage),
    path: "volumes",
    collection: "volumes",
    next: NextLink::Links("volumes_links"),
    operation: "list volumes",
};

const SNAPSHOTS: Listing = Listing {
    endpoint: Endpoint::Rest(RestService::BlockStorage),
    path: "snapshots",
    collection: "snapshots",
    next: NextLink::Links("snapshots_links"),
    operation: "list snapshots",
};

const GET_VOLUME: Lookup = Lookup {
    endpoint: Endpoint::Rest(RestService::BlockStorage),
    path: "volumes",
    envelope: Some("volume"),
    kind: "volume",
    operation: "get volume",
};

const GET_SNAPSHOT: Lookup = Lookup {
    endpoint: Endpoint::Rest(RestService::BlockStorage),
    path: "snapshots",
    envelope: Some("snapshot"),
    kind: "snapshot",
    operation: "get snapshot",
};

// =============================================================================
// Cloud Networks
// =============================================================================

const NETWORKS: Listing = Listing {
    endpoint: Endpoint::Rest(RestService::Networks),
    path: "networks",
    collection: "networks",
    next: NextLink::Links("networks_links"),
    operation: "list networks",
};

const PORTS: Listing = Listing {
    endpoint: Endpoint::Rest(RestService::Networks),
    path: "ports",
    collection: "ports",
    next: NextLink::Links("ports_links"),
    operation: "list ports",
};

const SUBNETS: Listing = Listing {
    endpoint: Endpoint::Rest(RestService::Networks),
    path: "subnets",
    collection: "subnets",
    next: NextLink::Links("subnets_links"),
    operation: "list subnets",
};

const SECURITY_GROUPS: Listing = Listing {
    endpoint: Endpoint::Rest(RestService::Networks),
    path: "security-groups",
    collection: "security_groups",
    next: NextLink::Links("security_groups_links"),
    operation: "list security groups",
};

// =============================================================================
// Cloud Load Balancers
// =============================================================================

const LOAD_BALANCERS: Listing = Listing {
    endpoint: Endpoint::Rest(RestService::LoadBalancers),
    path: "loadbalancers",
    collection: "loadBalancers",
    next: NextLink::Links("links"),
    operation: "list load balancers",
};

const GET_LOAD_BALANCER: Lookup = Lookup {
    endpoint: Endpoint::Rest(RestService::LoadBalancers),
    path: "loadbalancers",
    envelope: Some("loadBalancer"),
    kind: "load balancer",
    operation: "get load balancer",
};

/// Load balancer ids are integers. A key that is not the canonical form of
/// one (`"abc"`, `"007"`, `"+7"`) cannot match the row's id.
fn load_balancer_id(key: &str) -> Result<i64> {
    key.parse::<i64>()
        .ok()
        .filter(|id| id.to_string() == key)
        .ok_or_else(|| Error::NotFound {
            kind: GET_LOAD_BALANCER.kind,
            key: key.to_string(),
        })
}

// =============================================================================
// Cloud Queues
// =============================================================================

const QUEUES: Listing = Listing {
    endpoint: Endpoint::Rest(RestService::Queues),
    path: "queues",
    collection: "queues",
    next: NextLink::Links("links"),
    operation: "list queues",
};

async fn list_queues(conn: &Connection, out: &Emitter<'_>) -> Result<()> {
    let ctx = out.ctx();
    let (client, pager) = QUEUES.pager::<Queue>(conn, ctx).await?;
    let stats = out.wants("queue_stats");
    let metadata = out.wants("queue_metadata");

    for_each_hydrated(
        out,
        &pager,
        |queue| hydrate_queue(&client, ctx, queue, stats, metadata),
        ResourceItem::Queue,
    )
    .await
}

async fn hydrate_queue(
    client: &ServiceClient,
    ctx: &QueryContext,
    mut queue: Queue,
    stats: bool,
    metadata: bool,
) -> Result<Queue> {
    let name = encode(&queue.name);

    if stats {
        let url = client.url(&format!("queues/{name}/stats"))?;
        queue.stats = match client.get::<Value>(ctx, "get queue stats", &url).await? {
            Body::Json(mut body) => body.get_mut("messages").map(Value::take),
            Body::NoContent => None,
        };
    }

    if metadata {
        let url = client.url(&format!("queues/{name}/metadata"))?;
        queue.metadata = match client.get::<Value>(ctx, "get queue metadata", &url).await? {
            Body::Json(body) => Some(body),
            Body::NoContent => None,
        };
    }

    Ok(queue)
}

// =============================================================================
// Cloud DNS
// =============================================================================

const DNS_DOMAINS: Listing = Listing {
    endpoint: Endpoint::Rest(RestService::Dns),
    path: "domains",
    collection: "domains",
    next: NextLink::Links("links"),
    operation: "list DNS domains",
};

async fn list_dns_domains(conn: &Connection, out: &Emitter<'_>) -> Result<()> {
    let ctx = out.ctx();
    let (client, pager) = DNS_DOMAINS.pager::<DnsDomain>(conn, ctx).await?;
    let records = out.wants("dns_records");

    for_each_hydrated(
        out,
        &pager,
        |domain| hydrate_dns_domain(&client, ctx, domain, records),
        ResourceItem::DnsDomain,
    )
    .await
}

async fn hydrate_dns_domain(
    client: &ServiceClient,
    ctx: &QueryContext,
    mut domain: DnsDomain,
    records: bool,
) -> Result<DnsDomain> {
    if !records {
        return Ok(domain);
    }

    let pager = LinkPager::<Value>::new(
        client.clone(),
        &format!("domains/{}/records", encode(&domain.id)),
        "records",
        NextLink::Links("links"),
        "list DNS records",
    )?;

    let mut all = Vec::new();
    for_each_page(ctx, &pager, |record| {
        all.push(record);
        async { Ok(true) }
    })
    .await?;

    domain.records_list = Some(Value::Array(all));
    Ok(domain)
}

// =============================================================================
// Cloud Files
// =============================================================================

async fn list_containers(conn: &Connection, out: &Emitter<'_>) -> Result<()> {
    let ctx = out.ctx();
    let client = conn.service_client(ctx, ServiceKind::ObjectStore).await?;
    let pager = MarkerPager::<Container>::new(client.clone(), "", conn.config().page_size(), "list containers")?;
    let metadata = out.wants("container_metadata");

    for_each_hydrated(
        out,
        &pager,
        |container| hydrate_container(&client, ctx, container, metadata),
        ResourceItem::Container,
    )
    .await
}

async fn hydrate_container(
    client: &ServiceClient,
    ctx: &QueryContext,
    mut container: Container,
    metadata: bool,
) -> Result<Container> {
    if metadata {
        container.metadata = Some(container_metadata(client, ctx, &container.name).await?);
    }
    Ok(container)
}

async fn list_objects(conn: &Connection, out: &Emitter<'_>) -> Result<()> {
    let container = out
        .query
        .qual("container_name")
        .ok_or_else(|| Error::MissingQualifier("container_name".to_string()))?;

    let ctx = out.ctx();
    let client = conn.service_client(ctx, ServiceKind::ObjectStore).await?;
    let pager = MarkerPager::<Object>::new(client, &encode(container), conn.config().page_size(), "list objects")?;

    for_each_page(ctx, &pager, |object| out.emit(ResourceItem::Object(object))).await
}
