//! Integration tests for the Rackspace plugin using wiremock
//!
//! REST services are reached through `endpoint_override`; catalog services
//! authenticate against a mocked identity endpoint whose catalog points back
//! at the same mock server.

use async_trait::async_trait;
use rackscan::config::ConnectionParams;
use rackscan::rackspace::{Authenticator, Connection, Session};
use rackscan::{Cell, ConnectionConfig, Error, Plugin, Query, QueryContext, Row, RowSink};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{header, header_exists, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Config for direct REST services, all pointed at the mock server
fn rest_config(server: &MockServer) -> ConnectionConfig {
    ConnectionConfig {
        identity_endpoint: Some(format!("{}/v2.0/", server.uri())),
        tenant_id: Some("555".to_string()),
        token_id: Some("abc".to_string()),
        region: Some("hkg".to_string()),
        endpoint_override: Some(server.uri()),
        ..Default::default()
    }
}

/// Identity response whose catalog routes compute and object storage to the mock server
fn token_response(server: &MockServer) -> serde_json::Value {
    json!({
        "access": {
            "token": {
                "id": "session-token",
                "expires": "2030-01-01T00:00:00.000Z",
                "tenant": { "id": "555", "name": "555" }
            },
            "serviceCatalog": [
                {
                    "name": "cloudServersOpenStack",
                    "type": "compute",
                    "endpoints": [
                        { "region": "HKG", "tenantId": "555", "publicURL": format!("{}/v2/555", server.uri()) }
                    ]
                },
                {
                    "name": "cloudFiles",
                    "type": "object-store",
                    "endpoints": [
                        { "region": "HKG", "tenantId": "MossoCloudFS_555", "publicURL": format!("{}/v1/MossoCloudFS_555", server.uri()) }
                    ]
                }
            ]
        }
    })
}

async fn mount_identity(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v2.0/tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response(server)))
        .expect(1)
        .mount(server)
        .await;
}

/// Run a listing to completion and collect what it emitted
async fn list_all(plugin: &Plugin, table: &str, query: &Query) -> (rackscan::Result<()>, Vec<Row>) {
    let (sink, mut rx) = RowSink::channel(64);
    let result = plugin.list(table, query, &sink).await;
    drop(sink);

    let mut rows = Vec::new();
    while let Some(row) = rx.recv().await {
        rows.push(row);
    }
    (result, rows)
}

fn string_cell(row: &Row, column: &str) -> Option<String> {
    row.get(column).and_then(Cell::as_str).map(str::to_string)
}

mod rest_tests {
    use super::*;

    #[tokio::test]
    async fn test_dns_domains_list() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/555/domains"))
            .and(header("x-auth-token", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "domains": [
                    {
                        "id": 2725233,
                        "name": "example.com",
                        "accountId": 555,
                        "ttl": 300,
                        "emailAddress": "admin@example.com",
                        "created": "2011-06-24T01:23:15.000+0000"
                    }
                ],
                "totalEntries": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let plugin = assert_ok!(Plugin::new(rest_config(&server)));
        let query = Query::default().with_columns(["id", "name", "ttl", "created"]);
        let (result, rows) = list_all(&plugin, "rackspace_dns_domain", &query).await;

        assert_ok!(result);
        assert_eq!(rows.len(), 1);
        assert_eq!(string_cell(&rows[0], "id").as_deref(), Some("2725233"));
        assert_eq!(string_cell(&rows[0], "name").as_deref(), Some("example.com"));
        assert_eq!(rows[0].get("ttl"), Some(&Cell::Int(300)));
        assert!(matches!(rows[0].get("created"), Some(Cell::Timestamp(_))));
    }

    #[tokio::test]
    async fn test_401_yields_no_rows() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/555/domains"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "unauthorized": { "code": 401, "message": "No valid token provided" }
            })))
            .mount(&server)
            .await;

        let plugin = assert_ok!(Plugin::new(rest_config(&server)));
        let (result, rows) = list_all(&plugin, "rackspace_dns_domain", &Query::default()).await;

        let err = assert_err!(result);
        assert!(matches!(err, Error::UpstreamStatus { status: 401, .. }));
        assert!(err.to_string().contains("401"));
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_pagination_follows_next_links_exactly() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/555/domains"))
            .and(query_param_is_missing("offset"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "domains": [
                    { "id": 1, "name": "a.example.com" },
                    { "id": 2, "name": "b.example.com" }
                ],
                "links": [
                    { "rel": "next", "href": format!("{}/v1.0/555/domains?limit=2&offset=2", server.uri()) }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1.0/555/domains"))
            .and(query_param("offset", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "domains": [
                    { "id": 3, "name": "c.example.com" }
                ],
                "links": [
                    { "rel": "previous", "href": format!("{}/v1.0/555/domains?limit=2&offset=0", server.uri()) }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let plugin = assert_ok!(Plugin::new(rest_config(&server)));
        let query = Query::default().with_columns(["name"]);
        let (result, rows) = list_all(&plugin, "rackspace_dns_domain", &query).await;

        assert_ok!(result);
        let names: Vec<_> = rows.iter().filter_map(|r| string_cell(r, "name")).collect();
        assert_eq!(names, vec!["a.example.com", "b.example.com", "c.example.com"]);
    }

    #[tokio::test]
    async fn test_dns_records_hydrated_only_when_requested() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/555/domains"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "domains": [{ "id": 7, "name": "example.com", "ttl": 300 }]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1.0/555/domains/7/records"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": [
                    { "id": "A-1", "name": "www.example.com", "type": "A", "data": "192.0.2.1", "ttl": 300 }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let plugin = assert_ok!(Plugin::new(rest_config(&server)));

        let plain = Query::default().with_columns(["name", "ttl"]);
        let (result, rows) = list_all(&plugin, "rackspace_dns_domain", &plain).await;
        assert_ok!(result);
        assert_eq!(rows[0].get("records_list"), Some(&Cell::Null));

        let hydrated = Query::default().with_columns(["name", "records_list"]);
        let (result, rows) = list_all(&plugin, "rackspace_dns_domain", &hydrated).await;
        assert_ok!(result);
        match rows[0].get("records_list") {
            Some(Cell::Json(records)) => assert_eq!(records[0]["data"], "192.0.2.1"),
            other => panic!("expected records, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_queues_no_content_is_empty() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/555/queues"))
            .and(header_exists("client-id"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let plugin = assert_ok!(Plugin::new(rest_config(&server)));
        let (result, rows) = list_all(&plugin, "rackspace_message_queue", &Query::default()).await;

        assert_ok!(result);
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_queue_stats_hydrated_only_when_requested() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/555/queues"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "queues": [{ "name": "jobs", "href": "/v1/555/queues/jobs" }],
                "links": [{ "rel": "next", "href": "/v1/555/queues?marker=jobs" }]
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/555/queues"))
            .and(query_param("marker", "jobs"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/555/queues/jobs/stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": { "free": 4, "claimed": 1, "total": 5 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/555/queues/jobs/metadata"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let plugin = assert_ok!(Plugin::new(rest_config(&server)));
        let query = Query::default().with_columns(["name", "stats"]);
        let (result, rows) = list_all(&plugin, "rackspace_message_queue", &query).await;

        assert_ok!(result);
        assert_eq!(rows.len(), 1);
        assert_eq!(string_cell(&rows[0], "name").as_deref(), Some("jobs"));
        assert_eq!(
            rows[0].get("stats"),
            Some(&Cell::Json(json!({ "free": 4, "claimed": 1, "total": 5 })))
        );
        assert_eq!(rows[0].get("metadata"), Some(&Cell::Null));
    }

    #[tokio::test]
    async fn test_load_balancer_get_missing_is_none() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/555/loadbalancers/42"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "message": "Load balancer not found", "code": 404
            })))
            .expect(1)
            .mount(&server)
            .await;

        let plugin = assert_ok!(Plugin::new(rest_config(&server)));
        let query = Query::default().with_qual("id", "42");
        let row = assert_ok!(plugin.get("rackspace_loadbalancer", &query).await);
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn test_load_balancer_get_with_padded_key_makes_no_call() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "loadBalancer": { "id": 7, "name": "web" }
            })))
            .expect(0)
            .mount(&server)
            .await;

        let plugin = assert_ok!(Plugin::new(rest_config(&server)));
        let query = Query::default().with_qual("id", "007");
        assert_eq!(plugin.get("rackspace_loadbalancer", &query).await, Ok(None));
    }
}

mod catalog_tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_limits_is_empty_table() {
        let server = MockServer::start().await;
        mount_identity(&server).await;

        Mock::given(method("GET"))
            .and(path("/v2/555/limits"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let plugin = assert_ok!(Plugin::new(rest_config(&server)));
        let (result, rows) = list_all(&plugin, "rackspace_compute_limit", &Query::default()).await;

        assert_ok!(result);
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_container_get_merges_listing_and_metadata() {
        let server = MockServer::start().await;
        mount_identity(&server).await;

        Mock::given(method("GET"))
            .and(path("/v1/MossoCloudFS_555/"))
            .and(query_param("prefix", "logs"))
            .and(query_param("format", "json"))
            .and(header("x-auth-token", "session-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "name": "logs", "count": 0, "bytes": 2048 },
                { "name": "logs-archive", "count": 9, "bytes": 99 }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("HEAD"))
            .and(path("/v1/MossoCloudFS_555/logs"))
            .respond_with(
                ResponseTemplate::new(204)
                    .insert_header("X-Container-Meta-Owner", "ops")
                    .insert_header("X-Container-Object-Count", "17"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let plugin = assert_ok!(Plugin::new(rest_config(&server)));
        let query = Query::default().with_qual("name", "logs");
        let row = assert_ok!(plugin.get("rackspace_cloud_files_container", &query).await)
            .expect("container row");

        assert_eq!(string_cell(&row, "name").as_deref(), Some("logs"));
        assert_eq!(row.get("bytes"), Some(&Cell::Int(2048)));
        // Count comes from the listing, not the HEAD headers
        assert_eq!(row.get("count"), Some(&Cell::Int(0)));
        assert_eq!(row.get("metadata"), Some(&Cell::Json(json!({ "owner": "ops" }))));
    }

    #[tokio::test]
    async fn test_container_get_not_found_skips_head() {
        let server = MockServer::start().await;
        mount_identity(&server).await;

        Mock::given(method("GET"))
            .and(path("/v1/MossoCloudFS_555/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "name": "logs-archive", "count": 9, "bytes": 99 }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let plugin = assert_ok!(Plugin::new(rest_config(&server)));
        let query = Query::default().with_qual("name", "logs");
        assert_eq!(plugin.get("rackspace_cloud_files_container", &query).await, Ok(None));
    }

    #[tokio::test]
    async fn test_objects_page_by_marker() {
        let server = MockServer::start().await;
        mount_identity(&server).await;

        Mock::given(method("GET"))
            .and(path("/v1/MossoCloudFS_555/logs"))
            .and(query_param_is_missing("marker"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "name": "a.log", "bytes": 10, "content_type": "text/plain" },
                { "name": "b.log", "bytes": 0, "content_type": "text/plain" }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/MossoCloudFS_555/logs"))
            .and(query_param("marker", "b.log"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "name": "c.log", "bytes": 30, "content_type": "text/plain" }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = rest_config(&server);
        config.page_size = Some(2);
        let plugin = assert_ok!(Plugin::new(config));
        let query = Query::default().with_qual("container_name", "logs");
        let (result, rows) = list_all(&plugin, "rackspace_cloud_files_object", &query).await;

        assert_ok!(result);
        let names: Vec<_> = rows.iter().filter_map(|r| string_cell(r, "name")).collect();
        assert_eq!(names, vec!["a.log", "b.log", "c.log"]);
        assert_eq!(string_cell(&rows[2], "container_name").as_deref(), Some("logs"));
        assert_eq!(rows[1].get("bytes"), Some(&Cell::Int(0)));
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_cached() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2.0/tokens"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        mount_identity(&server).await;

        Mock::given(method("GET"))
            .and(path("/v2/555/flavors/detail"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "flavors": [
                    { "id": "2", "name": "512MB Standard Instance", "ram": 512, "vcpus": 1, "disk": 20 }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let plugin = assert_ok!(Plugin::new(rest_config(&server)));

        let (first, rows) = list_all(&plugin, "rackspace_compute_flavor", &Query::default()).await;
        assert!(matches!(assert_err!(first), Error::Auth(_)));
        assert!(rows.is_empty());

        let (second, rows) = list_all(&plugin, "rackspace_compute_flavor", &Query::default()).await;
        assert_ok!(second);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("ram"), Some(&Cell::Int(512)));
    }
}

mod config_tests {
    use super::*;

    /// Authenticator that only counts how often it is asked
    struct CountingAuthenticator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Authenticator for CountingAuthenticator {
        async fn authenticate(&self, _ctx: &QueryContext, params: &ConnectionParams) -> rackscan::Result<Session> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Session {
                token: params.token_id.clone(),
                expires: None,
                tenant_id: params.tenant_id.clone(),
                catalog: Vec::new(),
            })
        }
    }

    fn full_config() -> ConnectionConfig {
        ConnectionConfig {
            identity_endpoint: Some("https://identity.example.com/v2.0/".to_string()),
            tenant_id: Some("555".to_string()),
            token_id: Some("abc".to_string()),
            region: Some("hkg".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_each_missing_parameter_fails_before_any_call() {
        let cases: [(&str, fn(&mut ConnectionConfig)); 4] = [
            ("identity_endpoint", |c| c.identity_endpoint = None),
            ("tenant_id", |c| c.tenant_id = Some(String::new())),
            ("token_id", |c| c.token_id = None),
            ("region", |c| c.region = Some("  ".to_string())),
        ];

        for (field, clear) in cases {
            let mut config = full_config();
            clear(&mut config);

            let auth = Arc::new(CountingAuthenticator {
                calls: AtomicUsize::new(0),
            });
            let conn = assert_ok!(Connection::with_authenticator(config, auth.clone()));
            let plugin = Plugin::with_connection(conn);

            let (result, rows) = list_all(&plugin, "rackspace_compute", &Query::default()).await;
            assert_eq!(result, Err(Error::MissingConfig(field)));
            assert!(rows.is_empty());
            assert_eq!(auth.calls.load(Ordering::SeqCst), 0, "{field}");
        }
    }

    #[tokio::test]
    async fn test_missing_token_blocks_rest_services() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = rest_config(&server);
        config.token_id = None;
        let plugin = assert_ok!(Plugin::new(config));

        let (result, _) = list_all(&plugin, "rackspace_dns_domain", &Query::default()).await;
        assert_eq!(result, Err(Error::MissingConfig("token_id")));
    }

    #[tokio::test]
    async fn test_missing_catalog_endpoint() {
        let auth = Arc::new(CountingAuthenticator {
            calls: AtomicUsize::new(0),
        });
        let conn = assert_ok!(Connection::with_authenticator(full_config(), auth.clone()));
        let plugin = Plugin::with_connection(conn);

        let (result, _) = list_all(&plugin, "rackspace_image", &Query::default()).await;
        assert!(matches!(result, Err(Error::EndpointNotFound { .. })));

        // The session is reused by the next query
        let (result, _) = list_all(&plugin, "rackspace_compute_flavor", &Query::default()).await;
        assert!(matches!(result, Err(Error::EndpointNotFound { .. })));
        assert_eq!(auth.calls.load(Ordering::SeqCst), 1);
    }
}
