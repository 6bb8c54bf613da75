//! Resource models
//!
//! One typed struct per Rackspace resource kind. Fields the plugin works with
//! directly are typed; the rest of each provider document is kept in `extra`
//! so column paths can reach it.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Accept ids that arrive as either JSON strings or numbers
fn id_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flavor {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPair {
    pub name: String,
    #[serde(default)]
    pub fingerprint: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Entry of the keypair listing, which nests each keypair one level down
#[derive(Debug, Clone, Deserialize)]
pub struct KeyPairEntry {
    pub keypair: KeyPair,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default)]
    pub absolute: Map<String, Value>,
    #[serde(default)]
    pub rate: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub volume_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub subnets: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub network_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cidr: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub security_group_rules: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Queue {
    pub name: String,
    #[serde(default)]
    pub href: String,
    /// Message statistics, filled by per-row hydration
    #[serde(default)]
    pub stats: Option<Value>,
    /// Queue metadata, filled by per-row hydration
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsDomain {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub ttl: Option<i64>,
    /// Records of the domain, filled by per-row hydration
    #[serde(rename = "recordsList", default)]
    pub records_list: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A Cloud Files container.
///
/// `bytes` and `count` come from the account listing; `metadata` only from a
/// `HEAD` on the container itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
}

/// A Cloud Files object, or a pseudo-directory entry when listing with a delimiter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub subdir: Option<String>,
    #[serde(default)]
    pub bytes: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Items that can continue a marker-paginated listing
pub trait Marker {
    fn marker(&self) -> Option<&str>;
}

impl Marker for Container {
    fn marker(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl Marker for Object {
    fn marker(&self) -> Option<&str> {
        self.name.as_deref().or(self.subdir.as_deref())
    }
}

/// One provider entity, tagged by kind
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceItem {
    Server(Server),
    Flavor(Flavor),
    KeyPair(KeyPair),
    Limits(Limits),
    Image(Image),
    Volume(Volume),
    Snapshot(Snapshot),
    Network(Network),
    Port(Port),
    Subnet(Subnet),
    SecurityGroup(SecurityGroup),
    LoadBalancer(LoadBalancer),
    Queue(Queue),
    DnsDomain(DnsDomain),
    Container(Container),
    Object(Object),
}

impl ResourceItem {
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceItem::Server(_) => "server",
            ResourceItem::Flavor(_) => "flavor",
            ResourceItem::KeyPair(_) => "keypair",
            ResourceItem::Limits(_) => "limits",
            ResourceItem::Image(_) => "image",
            ResourceItem::Volume(_) => "volume",
            ResourceItem::Snapshot(_) => "snapshot",
            ResourceItem::Network(_) => "network",
            ResourceItem::Port(_) => "port",
            ResourceItem::Subnet(_) => "subnet",
            ResourceItem::SecurityGroup(_) => "security group",
            ResourceItem::LoadBalancer(_) => "load balancer",
            ResourceItem::Queue(_) => "queue",
            ResourceItem::DnsDomain(_) => "DNS domain",
            ResourceItem::Container(_) => "container",
            ResourceItem::Object(_) => "object",
        }
    }

    /// The document the row normalizer reads column paths from
    pub fn to_document(&self) -> Result<Value> {
        let value = match self {
            ResourceItem::Server(v) => serde_json::to_value(v),
            ResourceItem::Flavor(v) => serde_json::to_value(v),
            ResourceItem::KeyPair(v) => serde_json::to_value(v),
            ResourceItem::Limits(v) => serde_json::to_value(v),
            ResourceItem::Image(v) => serde_json::to_value(v),
            ResourceItem::Volume(v) => serde_json::to_value(v),
            ResourceItem::Snapshot(v) => serde_json::to_value(v),
            ResourceItem::Network(v) => serde_json::to_value(v),
            ResourceItem::Port(v) => serde_json::to_value(v),
            ResourceItem::Subnet(v) => serde_json::to_value(v),
            ResourceItem::SecurityGroup(v) => serde_json::to_value(v),
            ResourceItem::LoadBalancer(v) => serde_json::to_value(v),
            ResourceItem::Queue(v) => serde_json::to_value(v),
            ResourceItem::DnsDomain(v) => serde_json::to_value(v),
            ResourceItem::Container(v) => serde_json::to_value(v),
            ResourceItem::Object(v) => serde_json::to_value(v),
        };
        value.map_err(|e| Error::extraction(self.kind(), e))
    }
}
