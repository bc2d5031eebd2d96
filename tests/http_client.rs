//! Integration tests for the Azure DevOps HTTP client using wiremock.
//!
//! These run the real `HttpClient` against mocked endpoints and check URLs,
//! query parameters, authentication and status code handling.

use hemmer_provider_azuredevops::client::{
    AccessControlEntry, EndpointAuthorization, HttpClient, ProjectReference, SecurityApi,
    ServiceEndpoint, ServiceEndpointApi, ServiceEndpointProjectReference,
};
use hemmer_provider_azuredevops::{AzureDevOpsProvider, ProviderConfig, ProviderError, ProviderService};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// `Basic` credentials for an empty user name and the token `pat`.
const AUTHORIZATION: &str = "Basic OnBhdA==";
const PROJECT: &str = "9d1f3c2e-4b5a-4c6d-8e7f-0a1b2c3d4e5f";
const ENDPOINT: &str = "5a6b7c8d-9e0f-4a1b-8c2d-3e4f5a6b7c8d";
const GIT_NAMESPACE: &str = "2e9eb7ed-3c0a-47d4-87c1-0ffdd275fd87";

fn client(server: &MockServer) -> HttpClient {
    HttpClient::new(&ProviderConfig {
        org_service_url: server.uri(),
        personal_access_token: "pat".to_string(),
    })
    .unwrap()
}

fn project() -> Uuid {
    Uuid::parse_str(PROJECT).unwrap()
}

fn endpoint_id() -> Uuid {
    Uuid::parse_str(ENDPOINT).unwrap()
}

fn webhook_body() -> serde_json::Value {
    json!({
        "id": ENDPOINT,
        "name": "hook",
        "type": "incomingwebhook",
        "url": "https://dev.azure.com",
        "description": "Managed by Terraform",
        "owner": "library",
        "isReady": true,
        "authorization": {
            "scheme": "None",
            "parameters": {"webhookname": "build-trigger", "header": "X-Hub-Signature", "secret": null}
        },
        "serviceEndpointProjectReferences": [{
            "projectReference": {"id": PROJECT},
            "name": "hook",
            "description": "Managed by Terraform"
        }]
    })
}

mod service_endpoints {
    use super::*;

    #[tokio::test]
    async fn test_create_posts_endpoint() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/_apis/serviceendpoint/endpoints"))
            .and(query_param("api-version", "6.0-preview.4"))
            .and(header("authorization", AUTHORIZATION))
            .and(body_partial_json(json!({
                "name": "hook",
                "type": "incomingwebhook",
                "authorization": {"scheme": "None"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(webhook_body()))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = ServiceEndpoint {
            name: "hook".to_string(),
            endpoint_type: "incomingwebhook".to_string(),
            url: "https://dev.azure.com".to_string(),
            owner: "library".to_string(),
            authorization: EndpointAuthorization::new(
                "None",
                [("webhookname", "build-trigger"), ("secret", "s3cret")],
            ),
            service_endpoint_project_references: vec![ServiceEndpointProjectReference {
                project_reference: ProjectReference {
                    id: project(),
                    name: String::new(),
                },
                name: "hook".to_string(),
                description: String::new(),
            }],
            ..Default::default()
        };

        let created = client(&server).create_service_endpoint(&endpoint).await.unwrap();
        assert_eq!(created.id, Some(endpoint_id()));
        assert!(created.is_ready);
        // Null parameters are dropped on decode.
        assert!(created.authorization.parameters.get("secret").is_none());
        assert_eq!(created.authorization.parameter("header"), "X-Hub-Signature");
    }

    #[tokio::test]
    async fn test_get_returns_endpoint() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/{}/_apis/serviceendpoint/endpoints/{}", PROJECT, ENDPOINT)))
            .and(query_param("api-version", "6.0-preview.4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(webhook_body()))
            .mount(&server)
            .await;

        let endpoint = client(&server)
            .get_service_endpoint(project(), endpoint_id())
            .await
            .unwrap();
        assert_eq!(endpoint.name, "hook");
        assert_eq!(endpoint.endpoint_type, "incomingwebhook");
    }

    #[tokio::test]
    async fn test_get_with_empty_body_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/{}/_apis/serviceendpoint/endpoints/{}", PROJECT, ENDPOINT)))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = client(&server)
            .get_service_endpoint(project(), endpoint_id())
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_get_with_null_body_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/{}/_apis/serviceendpoint/endpoints/{}", PROJECT, ENDPOINT)))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .mount(&server)
            .await;

        let err = client(&server)
            .get_service_endpoint(project(), endpoint_id())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_find_by_name() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/{}/_apis/serviceendpoint/endpoints", PROJECT)))
            .and(query_param("endpointNames", "hook"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"count": 1, "value": [webhook_body()]})),
            )
            .mount(&server)
            .await;

        let found = client(&server)
            .find_service_endpoints_by_name(project(), "hook")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, Some(endpoint_id()));
    }

    #[tokio::test]
    async fn test_update_puts_endpoint() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path(format!("/_apis/serviceendpoint/endpoints/{}", ENDPOINT)))
            .and(body_partial_json(json!({"description": "changed"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(webhook_body()))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = ServiceEndpoint {
            id: Some(endpoint_id()),
            name: "hook".to_string(),
            description: "changed".to_string(),
            ..Default::default()
        };
        client(&server)
            .update_service_endpoint(endpoint_id(), &endpoint)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_passes_project_ids() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path(format!("/_apis/serviceendpoint/endpoints/{}", ENDPOINT)))
            .and(query_param("projectIds", PROJECT))
            .and(query_param("api-version", "6.0-preview.4"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .delete_service_endpoint(endpoint_id(), &[project()])
            .await
            .unwrap();
    }
}

mod status_codes {
    use super::*;

    async fn get_with_status(status: u16, body: serde_json::Value) -> ProviderError {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/{}/_apis/serviceendpoint/endpoints/{}", PROJECT, ENDPOINT)))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&server)
            .await;

        client(&server)
            .get_service_endpoint(project(), endpoint_id())
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn test_404_is_not_found() {
        let err = get_with_status(404, json!({"message": "VS402800: endpoint not found"})).await;
        match err {
            ProviderError::NotFound(message) => assert!(message.contains("VS402800")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_401_is_permission_denied() {
        let err = get_with_status(401, json!({})).await;
        assert!(matches!(err, ProviderError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_409_is_already_exists() {
        let err = get_with_status(409, json!({"message": "duplicate"})).await;
        assert!(matches!(err, ProviderError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_429_is_resource_exhausted() {
        let err = get_with_status(429, json!({})).await;
        assert!(matches!(err, ProviderError::ResourceExhausted(_)));
    }

    #[tokio::test]
    async fn test_503_is_unavailable() {
        let err = get_with_status(503, json!({"message": "try later"})).await;
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_400_is_invalid_request() {
        let err = get_with_status(400, json!({"message": "bad"})).await;
        assert!(matches!(err, ProviderError::InvalidRequest(m) if m == "bad"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_serialization_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/{}/_apis/serviceendpoint/endpoints/{}", PROJECT, ENDPOINT)))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;

        let err = client(&server)
            .get_service_endpoint(project(), endpoint_id())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Serialization(_)));
    }
}

mod security {
    use super::*;

    #[tokio::test]
    async fn test_action_definitions() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/_apis/securitynamespaces/{}", GIT_NAMESPACE)))
            .and(query_param("api-version", "6.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 1,
                "value": [{
                    "namespaceId": GIT_NAMESPACE,
                    "name": "Git Repositories",
                    "actions": [
                        {"bit": 2, "name": "GenericRead", "displayName": "Read"},
                        {"bit": 8, "name": "ForcePush", "displayName": "Force push"}
                    ]
                }]
            })))
            .mount(&server)
            .await;

        let actions = client(&server)
            .action_definitions(Uuid::parse_str(GIT_NAMESPACE).unwrap())
            .await
            .unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[1].name, "ForcePush");
        assert_eq!(actions[1].bit, 8);
    }

    #[tokio::test]
    async fn test_unknown_namespace_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/_apis/securitynamespaces/{}", GIT_NAMESPACE)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 0, "value": []})))
            .mount(&server)
            .await;

        let err = client(&server)
            .action_definitions(Uuid::parse_str(GIT_NAMESPACE).unwrap())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_access_control_lists() {
        let server = MockServer::start().await;
        let token = format!("repoV2/{}", PROJECT);

        Mock::given(method("GET"))
            .and(path(format!("/_apis/accesscontrollists/{}", GIT_NAMESPACE)))
            .and(query_param("token", token.as_str()))
            .and(query_param("descriptors", "Microsoft.TeamFoundation.Identity;S-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 1,
                "value": [{
                    "token": token,
                    "inheritPermissions": true,
                    "acesDictionary": {
                        "Microsoft.TeamFoundation.Identity;S-1": {
                            "descriptor": "Microsoft.TeamFoundation.Identity;S-1",
                            "allow": 2,
                            "deny": 8
                        }
                    }
                }]
            })))
            .mount(&server)
            .await;

        let acls = client(&server)
            .access_control_lists(
                Uuid::parse_str(GIT_NAMESPACE).unwrap(),
                &token,
                &["Microsoft.TeamFoundation.Identity;S-1".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(acls.len(), 1);
        let entry = &acls[0].aces_dictionary["Microsoft.TeamFoundation.Identity;S-1"];
        assert_eq!((entry.allow, entry.deny), (2, 8));
    }

    #[tokio::test]
    async fn test_set_access_control_entries() {
        let server = MockServer::start().await;
        let token = format!("repoV2/{}", PROJECT);

        Mock::given(method("POST"))
            .and(path(format!("/_apis/accesscontrolentries/{}", GIT_NAMESPACE)))
            .and(body_partial_json(json!({
                "token": token,
                "merge": false,
                "accessControlEntries": [{
                    "descriptor": "Microsoft.TeamFoundation.Identity;S-1",
                    "allow": 2,
                    "deny": 0
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 1, "value": []})))
            .expect(1)
            .mount(&server)
            .await;

        let entry = AccessControlEntry {
            descriptor: "Microsoft.TeamFoundation.Identity;S-1".to_string(),
            allow: 2,
            deny: 0,
        };
        client(&server)
            .set_access_control_entries(Uuid::parse_str(GIT_NAMESPACE).unwrap(), &token, &[entry], false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_identity_descriptor() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/_apis/identities"))
            .and(query_param("subjectDescriptors", "vssgp.Uy0x"))
            .and(query_param("queryMembership", "None"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 1,
                "value": [{
                    "descriptor": "Microsoft.TeamFoundation.Identity;S-1",
                    "subjectDescriptor": "vssgp.Uy0x"
                }]
            })))
            .mount(&server)
            .await;

        let descriptor = client(&server).identity_descriptor("vssgp.Uy0x").await.unwrap();
        assert_eq!(descriptor, "Microsoft.TeamFoundation.Identity;S-1");
    }
}

mod provider {
    use super::*;

    #[tokio::test]
    async fn test_configured_provider_creates_webhook() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/{}/_apis/serviceendpoint/endpoints", PROJECT)))
            .and(query_param("endpointNames", "hook"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 0, "value": []})))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/_apis/serviceendpoint/endpoints"))
            .and(body_partial_json(json!({
                "type": "incomingwebhook",
                "authorization": {"parameters": {"secret": "s3cret"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(webhook_body()))
            .expect(1)
            .mount(&server)
            .await;

        let provider = AzureDevOpsProvider::new();
        let diagnostics = provider
            .configure(json!({
                "org_service_url": server.uri(),
                "personal_access_token": "pat"
            }))
            .await
            .unwrap();
        assert!(diagnostics.is_empty());

        let config = json!({
            "project_id": PROJECT,
            "service_endpoint_name": "hook",
            "webhook_name": "build-trigger",
            "http_header": "X-Hub-Signature",
            "secret": "s3cret"
        });
        let plan = provider
            .plan("azuredevops_serviceendpoint_incomingwebhook", None, config.clone(), config)
            .await
            .unwrap();
        let state = provider
            .create("azuredevops_serviceendpoint_incomingwebhook", plan.planned_state)
            .await
            .unwrap();

        assert_eq!(state["id"], ENDPOINT);
        assert_eq!(state["secret"], "s3cret");
        assert_eq!(
            state["secret_hash"],
            json!(hemmer_provider_azuredevops::secret::hash("s3cret"))
        );
    }

    #[tokio::test]
    async fn test_read_endpoint_without_id_is_absent() {
        let server = MockServer::start().await;

        let mut body = webhook_body();
        body.as_object_mut().unwrap().remove("id");
        Mock::given(method("GET"))
            .and(path(format!("/{}/_apis/serviceendpoint/endpoints/{}", PROJECT, ENDPOINT)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let provider = AzureDevOpsProvider::new();
        provider
            .configure(json!({
                "org_service_url": server.uri(),
                "personal_access_token": "pat"
            }))
            .await
            .unwrap();

        let state = provider
            .read(
                "azuredevops_serviceendpoint_incomingwebhook",
                json!({
                    "id": ENDPOINT,
                    "project_id": PROJECT,
                    "service_endpoint_name": "hook",
                    "webhook_name": "build-trigger"
                }),
            )
            .await
            .unwrap();
        assert!(state.is_null());
    }

    #[tokio::test]
    async fn test_create_with_unreadable_response_deletes_endpoint() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/{}/_apis/serviceendpoint/endpoints", PROJECT)))
            .and(query_param("endpointNames", "argo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 0, "value": []})))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/_apis/serviceendpoint/endpoints"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": ENDPOINT,
                "name": "argo",
                "type": "argocd",
                "url": "https://argocd.example.com",
                "owner": "library",
                "authorization": {"scheme": "OAuth", "parameters": {}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path(format!("/_apis/serviceendpoint/endpoints/{}", ENDPOINT)))
            .and(query_param("projectIds", PROJECT))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let provider = AzureDevOpsProvider::new();
        provider
            .configure(json!({
                "org_service_url": server.uri(),
                "personal_access_token": "pat"
            }))
            .await
            .unwrap();

        let err = provider
            .create(
                "azuredevops_serviceendpoint_argocd",
                json!({
                    "project_id": PROJECT,
                    "service_endpoint_name": "argo",
                    "description": "Managed by Terraform",
                    "url": "https://argocd.example.com",
                    "authentication_token": [{"token": "t0ken"}]
                }),
            )
            .await
            .unwrap_err();
        assert!(
            matches!(err, ProviderError::InconsistentAuthorization { .. }),
            "unexpected error: {err}"
        );
    }
}
