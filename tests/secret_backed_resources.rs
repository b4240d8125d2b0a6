//! Settings and Variables over their delegated Secrets: masking, conversion,
//! idempotent deletion and watch deduplication.

mod common;

use common::{next_frame, request, Harness, SYSTEM};
use serde_json::json;
use walrus::client::ObjectClient as _;
use walrus::constants::{SENSITIVE_PLACEHOLDER, VARIABLES_DELEGATED_SECRET_NAME};
use walrus::extensionapi::{DeleteOptions, GetOptions, ListOptions, UpdateBody, UpdateOptions};
use walrus::kubemeta;

#[tokio::test]
async fn sensitive_variable_is_masked_and_never_serialized_raw() {
    let h = Harness::new().await;
    let created = h.create_variable(SYSTEM, "db-password", "s3cr3t", true).await;
    assert_eq!(created["status"]["value"], SENSITIVE_PLACEHOLDER);
    assert!(!created.to_string().contains("s3cr3t"));

    let got = h
        .storage("variables")
        .get(&request("variables", SYSTEM), "db-password", &GetOptions::default())
        .await
        .unwrap();
    assert_eq!(got["status"]["value"], SENSITIVE_PLACEHOLDER);
    assert!(!got.to_string().contains("s3cr3t"));

    let secret = h
        .clients
        .secrets
        .get(Some(SYSTEM), VARIABLES_DELEGATED_SECRET_NAME)
        .await
        .unwrap();
    assert_eq!(kubemeta::secret_value(&secret, "db-password").as_deref(), Some("s3cr3t"));
}

#[tokio::test]
async fn variable_round_trips_through_its_secret() {
    let h = Harness::new().await;
    let created = h.create_variable(SYSTEM, "region", "eu-west-1", false).await;
    let got = h
        .storage("variables")
        .get(&request("variables", SYSTEM), "region", &GetOptions::default())
        .await
        .unwrap();
    assert_eq!(got["status"]["value"], "eu-west-1");
    assert_eq!(got["spec"]["sensitive"], false);
    assert_eq!(got["metadata"]["uid"], created["metadata"]["uid"]);
    assert_eq!(
        got["metadata"]["creationTimestamp"],
        created["metadata"]["creationTimestamp"]
    );
}

#[tokio::test]
async fn sensitive_setting_is_masked() {
    let h = Harness::new().await;
    let settings = h.storage("settings");
    let ctx = request("settings", SYSTEM);
    let (updated, _) = settings
        .update(
            &ctx,
            "serve-object-storage-url",
            UpdateBody::MergePatch(json!({"spec": {"value": "s3://key:secret@bucket"}})),
            &UpdateOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(updated["status"]["value"], SENSITIVE_PLACEHOLDER);
    assert!(!updated.to_string().contains("key:secret"));
}

#[tokio::test]
async fn repeated_and_collection_deletes_of_variables() {
    let h = Harness::new().await;
    let variables = h.storage("variables");
    let ctx = request("variables", SYSTEM);
    h.create_variable(SYSTEM, "region", "eu-west-1", false).await;

    variables
        .delete(&ctx, "region", &DeleteOptions::default())
        .await
        .unwrap();
    // Deleting it again, or something that never existed, succeeds.
    variables
        .delete(&ctx, "region", &DeleteOptions::default())
        .await
        .unwrap();
    let (status, _) = variables
        .delete(&ctx, "never-existed", &DeleteOptions::default())
        .await
        .unwrap();
    assert_eq!(status["details"]["name"], "never-existed");

    // Absent items inside a collection delete are skipped.
    h.create_variable(SYSTEM, "a", "1", false).await;
    h.create_variable(SYSTEM, "b", "2", false).await;
    let deleted = variables
        .delete_collection(&ctx, &DeleteOptions::default(), &ListOptions::default().in_namespace(Some(SYSTEM)))
        .await
        .unwrap();
    assert_eq!(deleted["items"].as_array().unwrap().len(), 2);

    let left = variables
        .list(&ctx, &ListOptions::default().in_namespace(Some(SYSTEM)), false)
        .await
        .unwrap();
    assert!(left["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn variable_watch_deduplicates_and_collects_removed_keys() {
    let h = Harness::new().await;
    h.create_variable(SYSTEM, "region", "eu-west-1", false).await;

    let ctx = request("variables", SYSTEM);
    let mut frames = h
        .storage("variables")
        .watch(&ctx, &ListOptions::default().in_namespace(Some(SYSTEM)))
        .await
        .unwrap();

    // A Secret event without data changes yields nothing.
    let mut secret = h
        .clients
        .secrets
        .get(Some(SYSTEM), VARIABLES_DELEGATED_SECRET_NAME)
        .await
        .unwrap();
    secret
        .metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert("touched".to_string(), "true".to_string());
    let touched = h.clients.secrets.update(&secret, &UpdateOptions::default()).await.unwrap();
    assert_ne!(touched.metadata.resource_version, secret.metadata.resource_version);
    let secret = touched;

    // One new key yields one ADDED.
    let mut changed = secret.clone();
    kubemeta::set_secret_value(&mut changed, "zone", "eu-west-1a");
    let secret = h.clients.secrets.update(&changed, &UpdateOptions::default()).await.unwrap();
    let frame = next_frame(&mut frames).await.unwrap();
    assert_eq!(frame["type"], "ADDED");
    assert_eq!(frame["object"]["metadata"]["name"], "zone");

    // One removed key yields one synthesized DELETED.
    let mut changed = secret.clone();
    kubemeta::remove_secret_value(&mut changed, "region");
    h.clients.secrets.update(&changed, &UpdateOptions::default()).await.unwrap();
    let frame = next_frame(&mut frames).await.unwrap();
    assert_eq!(frame["type"], "DELETED");
    assert_eq!(frame["object"]["metadata"]["name"], "region");
}

#[tokio::test]
async fn setting_watch_skips_unchanged_values() {
    let h = Harness::new().await;
    let settings = h.storage("settings");
    let ctx = request("settings", SYSTEM);
    let mut frames = settings
        .watch(&ctx, &ListOptions::default().in_namespace(Some(SYSTEM)))
        .await
        .unwrap();

    let patch = |value: &str| UpdateBody::MergePatch(json!({"spec": {"value": value}}));
    settings
        .update(&ctx, "deployer-no-proxy", patch("localhost"), &UpdateOptions::default())
        .await
        .unwrap();
    let frame = next_frame(&mut frames).await.unwrap();
    assert_eq!(frame["type"], "MODIFIED");
    assert_eq!(frame["object"]["metadata"]["name"], "deployer-no-proxy");

    // Same value again, then another setting: only the latter shows up.
    settings
        .update(&ctx, "deployer-no-proxy", patch("localhost"), &UpdateOptions::default())
        .await
        .unwrap();
    settings
        .update(&ctx, "deployer-http-proxy", patch("http://proxy:3128"), &UpdateOptions::default())
        .await
        .unwrap();
    let frame = next_frame(&mut frames).await.unwrap();
    assert_eq!(frame["object"]["metadata"]["name"], "deployer-http-proxy");
}
