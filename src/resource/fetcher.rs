//! Item Fetcher
//!
//! Resolves single items by key, either with one direct `GET` or with the
//! container composite (list scan, then `HEAD`).

use super::model::Container;
use super::pager::{for_each_page, MarkerPager, PageSource};
use crate::context::QueryContext;
use crate::error::{Error, Result};
use crate::rackspace::client::ServiceClient;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

/// Prefix of custom container metadata headers
const CONTAINER_META_PREFIX: &str = "x-container-meta-";

/// Fetch one item by key with a direct `GET`.
///
/// `envelope` names the key wrapping the item in the response body, for
/// services that answer `{"server": {...}}`. A 404 becomes
/// [`Error::NotFound`].
pub async fn get_by_key<T: DeserializeOwned>(
    client: &ServiceClient,
    ctx: &QueryContext,
    operation: &'static str,
    kind: &'static str,
    key: &str,
    path: &str,
    envelope: Option<&str>,
) -> Result<T> {
    let url = client.url(path)?;

    let mut body: Value = client
        .get_required(ctx, operation, &url)
        .await
        .map_err(|e| not_found_on_404(e, kind, key))?;

    let raw = match envelope {
        Some(field) => match body.get_mut(field).map(Value::take) {
            Some(Value::Null) | None => {
                return Err(Error::NotFound {
                    kind,
                    key: key.to_string(),
                })
            }
            Some(raw) => raw,
        },
        None => body,
    };

    serde_json::from_value(raw).map_err(|e| Error::extraction(operation, e))
}

fn not_found_on_404(err: Error, kind: &'static str, key: &str) -> Error {
    match err {
        Error::UpstreamStatus { status: 404, .. } => Error::NotFound {
            kind,
            key: key.to_string(),
        },
        other => other,
    }
}

/// Scan a listing for the first item matching `predicate`, stopping there
pub async fn find_first<P, F>(ctx: &QueryContext, source: &P, mut predicate: F) -> Result<Option<P::Item>>
where
    P: PageSource + ?Sized,
    F: FnMut(&P::Item) -> bool,
{
    let mut found = None;
    for_each_page(ctx, source, |item| {
        let hit = predicate(&item);
        if hit {
            found = Some(item);
        }
        async move { Ok(!hit) }
    })
    .await?;
    Ok(found)
}

/// Collect the custom metadata of a container from its response headers.
///
/// Keys are lowercased with the `X-Container-Meta-` prefix removed.
pub fn metadata_from_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(CONTAINER_META_PREFIX)?;
            let value = value.to_str().ok()?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// `HEAD` a container and return its custom metadata
pub async fn container_metadata(
    client: &ServiceClient,
    ctx: &QueryContext,
    name: &str,
) -> Result<BTreeMap<String, String>> {
    let url = client.url(&urlencoding::encode(name))?;
    let headers = client
        .head(ctx, "get container metadata", &url)
        .await
        .map_err(|e| not_found_on_404(e, "container", name))?;
    Ok(metadata_from_headers(&headers))
}

/// Merge the two halves of a container.
///
/// The listing is authoritative for name, bytes and count; the `HEAD` for
/// metadata.
pub fn merge_container(listing: Container, metadata: BTreeMap<String, String>) -> Container {
    Container {
        metadata: Some(metadata),
        ..listing
    }
}

/// Fetch a container by name: find it in the account listing, then read its
/// metadata. Nothing is requested after the listing when the name is absent.
pub async fn get_container(
    client: &ServiceClient,
    ctx: &QueryContext,
    name: &str,
    page_size: u32,
) -> Result<Container> {
    let pager =
        MarkerPager::<Container>::new(client.clone(), "", page_size, "list containers")?.with_prefix(name);

    let listing = find_first(ctx, &pager, |c| c.name == name)
        .await?
        .ok_or_else(|| Error::NotFound {
            kind: "container",
            key: name.to_string(),
        })?;

    tracing::debug!("Container {} found in listing, reading metadata", name);
    let metadata = container_metadata(client, ctx, name).await?;

    Ok(merge_container(listing, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_metadata_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-container-meta-owner", HeaderValue::from_static("ops"));
        headers.insert("X-Container-Meta-Backup-Policy", HeaderValue::from_static("daily"));
        headers.insert("x-container-object-count", HeaderValue::from_static("3"));
        headers.insert("content-type", HeaderValue::from_static("text/plain"));

        let metadata = metadata_from_headers(&headers);
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata["owner"], "ops");
        assert_eq!(metadata["backup-policy"], "daily");
    }

    #[test]
    fn test_merge_keeps_listing_counts() {
        let listing = Container {
            name: "logs".to_string(),
            bytes: 2048,
            count: 0,
            metadata: None,
        };
        let metadata = BTreeMap::from([("owner".to_string(), "ops".to_string())]);

        let merged = merge_container(listing, metadata.clone());
        assert_eq!(merged.name, "logs");
        assert_eq!(merged.bytes, 2048);
        assert_eq!(merged.count, 0);
        assert_eq!(merged.metadata, Some(metadata));
    }

    #[test]
    fn test_404_maps_to_not_found() {
        let err = Error::UpstreamStatus {
            operation: "get server".to_string(),
            status: 404,
            reason: None,
        };
        assert!(not_found_on_404(err, "server", "abc").is_not_found());

        let other = Error::UpstreamStatus {
            operation: "get server".to_string(),
            status: 500,
            reason: None,
        };
        assert!(!not_found_on_404(other, "server", "abc").is_not_found());
    }
}
