//! Acceptance tests for `azuredevops_serviceendpoint_incomingwebhook`.
//!
//! These talk to a real organization and only compile with
//! `--features acceptance`. Required environment:
//!
//! - `AZDO_ORG_SERVICE_URL`
//! - `AZDO_PERSONAL_ACCESS_TOKEN`
//! - `AZDO_TEST_PROJECT_ID`
#![cfg(feature = "acceptance")]

use hemmer_provider_azuredevops::testing::{
    assert_plan_changes_attribute, assert_plan_no_changes, assert_plan_updates_in_place,
    ProviderTester, TestError,
};
use hemmer_provider_azuredevops::{AzureDevOpsProvider, ProviderError};
use serde_json::{json, Value};
use uuid::Uuid;

const RESOURCE: &str = "azuredevops_serviceendpoint_incomingwebhook";

fn project_id() -> String {
    std::env::var("AZDO_TEST_PROJECT_ID").expect("AZDO_TEST_PROJECT_ID must be set")
}

fn unique_name(prefix: &str) -> String {
    format!("{}-{}", prefix, &Uuid::new_v4().simple().to_string()[..8])
}

async fn tester() -> ProviderTester<AzureDevOpsProvider> {
    hemmer_provider_azuredevops::try_init_logging();
    let tester = ProviderTester::new(AzureDevOpsProvider::new());
    // Credentials come from AZDO_ORG_SERVICE_URL / AZDO_PERSONAL_ACCESS_TOKEN.
    tester.configure(json!({})).await.expect("provider configuration");
    tester
}

fn basic_config(name: &str) -> Value {
    json!({
        "project_id": project_id(),
        "service_endpoint_name": name,
        "webhook_name": "acctest"
    })
}

fn complete_config(name: &str, description: &str) -> Value {
    json!({
        "project_id": project_id(),
        "service_endpoint_name": name,
        "description": description,
        "webhook_name": "acctest",
        "http_header": "X-Hub-Signature",
        "secret": "acctest-secret"
    })
}

#[tokio::test]
async fn test_basic() {
    let tester = tester().await;
    let name = unique_name("acc-basic");

    let state = tester
        .lifecycle_create(RESOURCE, basic_config(&name))
        .await
        .unwrap();
    assert_eq!(state["service_endpoint_name"], json!(name));
    assert_eq!(state["webhook_name"], "acctest");
    assert_eq!(state["description"], "Managed by Terraform");

    let plan = tester
        .plan_update(RESOURCE, state.clone(), basic_config(&name))
        .await
        .unwrap();
    assert_plan_no_changes(&plan);

    tester.lifecycle_delete(RESOURCE, state.clone()).await.unwrap();
    assert!(tester.read(RESOURCE, state).await.unwrap().is_null());
}

#[tokio::test]
async fn test_complete() {
    let tester = tester().await;
    let name = unique_name("acc-complete");
    let config = complete_config(&name, "acceptance test");

    let state = tester.lifecycle_create(RESOURCE, config.clone()).await.unwrap();
    assert_eq!(state["description"], "acceptance test");
    assert_eq!(state["http_header"], "X-Hub-Signature");
    assert_eq!(state["secret"], "acctest-secret");

    let plan = tester
        .plan_update(RESOURCE, state.clone(), config)
        .await
        .unwrap();
    assert_plan_no_changes(&plan);

    tester.lifecycle_delete(RESOURCE, state).await.unwrap();
}

#[tokio::test]
async fn test_update() {
    let tester = tester().await;
    let name = unique_name("acc-update");

    let state = tester
        .lifecycle_create(RESOURCE, basic_config(&name))
        .await
        .unwrap();

    let renamed = unique_name("acc-updated");
    let updated_config = complete_config(&renamed, "updated");
    let plan = tester
        .plan_update(RESOURCE, state.clone(), updated_config.clone())
        .await
        .unwrap();
    assert_plan_updates_in_place(&plan);
    assert_plan_changes_attribute(&plan, "service_endpoint_name");
    assert_plan_changes_attribute(&plan, "secret");

    let updated = tester
        .lifecycle_update(RESOURCE, state.clone(), updated_config)
        .await
        .unwrap();
    assert_eq!(updated["id"], state["id"]);
    assert_eq!(updated["service_endpoint_name"], json!(renamed));
    assert_eq!(updated["description"], "updated");
    assert_eq!(updated["http_header"], "X-Hub-Signature");

    tester.lifecycle_delete(RESOURCE, updated).await.unwrap();
}

#[tokio::test]
async fn test_requires_import() {
    let tester = tester().await;
    let name = unique_name("acc-import");

    let state = tester
        .lifecycle_create(RESOURCE, basic_config(&name))
        .await
        .unwrap();

    let err = tester
        .lifecycle_create(RESOURCE, basic_config(&name))
        .await
        .unwrap_err();
    assert!(
        matches!(err, TestError::Provider(ProviderError::AlreadyExists(_))),
        "unexpected error: {err}"
    );

    let import_id = format!("{}/{}", project_id(), state["id"].as_str().unwrap());
    let imported = tester.import_resource(RESOURCE, &import_id).await.unwrap();
    assert_eq!(imported[0].state["service_endpoint_name"], json!(name));

    tester.lifecycle_delete(RESOURCE, state).await.unwrap();
}
