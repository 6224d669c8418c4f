//! Blob service integration tests using wiremock.
//!
//! The endpoint template points at the mock server path-style
//! (`http://127.0.0.1:port/{account}`), the same shape the storage emulator
//! uses, so requests land on `/{account}/...`.

use az_sweep::error::SweepError;
use az_sweep::storage::BlobClient;
use wiremock::matchers::{header, header_exists, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// base64("secret-key")
const KEY: &str = "c2VjcmV0LWtleQ==";

fn mock_blob_client(server: &MockServer) -> BlobClient {
    BlobClient::new("sa1", KEY, &format!("{}/{{account}}", server.uri())).unwrap()
}

fn xml(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "application/xml")
        .set_body_string(body.to_string())
}

#[tokio::test]
async fn list_blobs_follows_next_marker() {
    let server = MockServer::start().await;
    let client = mock_blob_client(&server);

    Mock::given(method("GET"))
        .and(path("/sa1/vhds"))
        .and(query_param("restype", "container"))
        .and(query_param("comp", "list"))
        .and(query_param_is_missing("marker"))
        .respond_with(xml(
            r#"<?xml version="1.0" encoding="utf-8"?>
            <EnumerationResults ContainerName="vhds">
              <Blobs>
                <Blob><Name>a.vhd</Name><Properties><BlobType>PageBlob</BlobType><LeaseStatus>locked</LeaseStatus><LeaseState>leased</LeaseState></Properties></Blob>
              </Blobs>
              <NextMarker>page-2</NextMarker>
            </EnumerationResults>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sa1/vhds"))
        .and(query_param("marker", "page-2"))
        .respond_with(xml(
            r#"<?xml version="1.0" encoding="utf-8"?>
            <EnumerationResults ContainerName="vhds">
              <Blobs>
                <Blob><Name>b.vhd</Name><Properties><LeaseStatus>unlocked</LeaseStatus><LeaseState>available</LeaseState></Properties></Blob>
              </Blobs>
              <NextMarker />
            </EnumerationResults>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let blobs = client.list_blobs("vhds").await.unwrap();
    let names: Vec<&str> = blobs.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["a.vhd", "b.vhd"]);
    assert_eq!(blobs[0].properties.lease_state.as_deref(), Some("leased"));
    assert!(blobs[0].is_vhd());
    assert_eq!(blobs[1].properties.lease_status.as_deref(), Some("unlocked"));
}

#[tokio::test]
async fn list_containers_of_empty_account() {
    let server = MockServer::start().await;
    let client = mock_blob_client(&server);

    Mock::given(method("GET"))
        .and(path("/sa1/"))
        .and(query_param("comp", "list"))
        .respond_with(xml(
            r#"<?xml version="1.0" encoding="utf-8"?>
            <EnumerationResults ServiceEndpoint="http://localhost/sa1/"><Containers /><NextMarker /></EnumerationResults>"#,
        ))
        .mount(&server)
        .await;

    assert!(client.list_containers().await.unwrap().is_empty());
}

#[tokio::test]
async fn requests_are_signed_with_shared_key() {
    let server = MockServer::start().await;
    let client = mock_blob_client(&server);

    Mock::given(method("DELETE"))
        .and(path("/sa1/vhds/old.vhd"))
        .and(header_exists("x-ms-date"))
        .and(header("x-ms-version", "2021-08-06"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    client.delete_blob("vhds", "old.vhd").await.unwrap();

    let requests: Vec<Request> = server.received_requests().await.unwrap();
    let auth = requests[0]
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert!(auth.starts_with("SharedKey sa1:"), "got {auth}");
}

#[tokio::test]
async fn delete_container_sends_restype() {
    let server = MockServer::start().await;
    let client = mock_blob_client(&server);

    Mock::given(method("DELETE"))
        .and(path("/sa1/vm1-vhds"))
        .and(query_param("restype", "container"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    client.delete_container("vm1-vhds").await.unwrap();
}

#[tokio::test]
async fn leased_blob_delete_surfaces_precondition_failure() {
    let server = MockServer::start().await;
    let client = mock_blob_client(&server);

    Mock::given(method("DELETE"))
        .and(path("/sa1/vhds/live.vhd"))
        .respond_with(ResponseTemplate::new(412).set_body_string(
            "<Error><Code>LeaseIdMissing</Code><Message>There is currently a lease on the blob</Message></Error>",
        ))
        .mount(&server)
        .await;

    let err = client.delete_blob("vhds", "live.vhd").await.unwrap_err();
    match err {
        SweepError::Api { status, body } => {
            assert_eq!(status.as_u16(), 412);
            assert!(body.contains("LeaseIdMissing"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_listing_is_xml_error() {
    let server = MockServer::start().await;
    let client = mock_blob_client(&server);

    Mock::given(method("GET"))
        .and(path("/sa1/vhds"))
        .respond_with(xml("<EnumerationResults><Blobs><Blob>"))
        .mount(&server)
        .await;

    let err = client.list_blobs("vhds").await.unwrap_err();
    assert!(matches!(err, SweepError::Xml(_)), "got {err:?}");
}
