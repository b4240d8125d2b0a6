//! Collection deletes page through the whole list.

mod common;

use common::{request, Harness};
use std::collections::HashSet;
use walrus::apis::walruscore::v1::{Template, TemplateSpec};
use walrus::client::ObjectClient as _;
use walrus::constants::{COLLECTION_DELETE_CHANNEL_CAPACITY, DEFAULT_COLLECTION_DELETE_LIMIT};
use walrus::extensionapi::{CreateOptions, DeleteOptions, ListOptions};

async fn create_templates(h: &Harness, count: usize) {
    for i in 0..count {
        let mut template = Template::new(&format!("template-{i:04}"), TemplateSpec::default());
        template.metadata.namespace = Some("acme".to_string());
        h.clients
            .templates
            .create(&template, &CreateOptions::default())
            .await
            .unwrap();
    }
}

async fn delete_all(h: &Harness, count: usize) {
    let ctx = request("templates", "acme");
    let in_acme = ListOptions::default().in_namespace(Some("acme"));
    let deleted = h
        .storage("templates")
        .delete_collection(&ctx, &DeleteOptions::default(), &in_acme)
        .await
        .unwrap();

    let items = deleted["items"].as_array().unwrap();
    assert_eq!(items.len(), count);
    let names: HashSet<_> = items
        .iter()
        .map(|item| item["metadata"]["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names.len(), count);

    let left = h.clients.templates.list(&in_acme).await.unwrap();
    assert!(left.items.is_empty());
}

#[tokio::test]
async fn deletes_more_than_the_channel_holds_exactly_once() {
    let h = Harness::new().await;
    let count = COLLECTION_DELETE_CHANNEL_CAPACITY + 44;
    create_templates(&h, count).await;
    delete_all(&h, count).await;
}

#[tokio::test]
async fn follows_continue_tokens_across_pages() {
    let h = Harness::new().await;
    let count = usize::try_from(DEFAULT_COLLECTION_DELETE_LIMIT).unwrap() + 100;
    create_templates(&h, count).await;
    delete_all(&h, count).await;
}

#[tokio::test]
async fn dry_run_keeps_everything() {
    let h = Harness::new().await;
    create_templates(&h, 3).await;

    let ctx = request("templates", "acme");
    let in_acme = ListOptions::default().in_namespace(Some("acme"));
    let opts = DeleteOptions {
        dry_run: true,
        ..DeleteOptions::default()
    };
    h.storage("templates")
        .delete_collection(&ctx, &opts, &in_acme)
        .await
        .unwrap();

    let left = h.clients.templates.list(&in_acme).await.unwrap();
    assert_eq!(left.items.len(), 3);
}
