//! Integration tests for the download path and the background reclaimer.

mod common;

use common::{setup, upload};
use resource_store::{
    config::ReclaimConfig,
    errors::ServiceError,
    services::reclaimer::Reclaimer,
};

#[tokio::test]
async fn large_bodies_round_trip_across_many_frames() {
    let env = setup().await;

    let body: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    let reply = upload(&env.service, "wks-A", "big.jar", 1, &body).await.unwrap();

    let (meta, data) = common::download(&env.service, &reply.resource_id).await;
    assert_eq!(meta.name, "big.jar");
    assert_eq!(meta.size, body.len() as i64);
    assert_eq!(data, body);
}

#[tokio::test]
async fn empty_bodies_download_as_metadata_only() {
    let env = setup().await;

    let reply = upload(&env.service, "wks-A", "empty.jar", 1, b"").await.unwrap();
    let (meta, data) = common::download(&env.service, &reply.resource_id).await;
    assert_eq!(meta.size, 0);
    assert!(data.is_empty());
}

#[tokio::test]
async fn download_of_unknown_id_is_not_exists() {
    let env = setup().await;
    let err = env
        .service
        .download_file("res-missing")
        .await
        .map(|_| ())
        .unwrap_err();
    assert!(matches!(err, ServiceError::ResourceNotExists(_)));
}

#[tokio::test]
async fn reclaimer_sweeps_deleted_bodies_but_keeps_live_ones() {
    let env = setup().await;

    let dead = upload(&env.service, "wks-A", "dead.jar", 1, b"dead").await.unwrap();
    let live = upload(&env.service, "wks-A", "live.jar", 1, b"live").await.unwrap();
    env.service
        .delete_resources(std::slice::from_ref(&dead.resource_id), "wks-A")
        .await
        .unwrap();
    assert_eq!(env.workspace_files("wks-A").len(), 2);

    let reclaimer = Reclaimer::new(
        env.service.db.clone(),
        env.service.backend.clone(),
        ReclaimConfig {
            enabled: true,
            interval_secs: 3600,
            min_age_secs: 0,
        },
    );
    assert_eq!(reclaimer.sweep().await.unwrap(), 1);

    // Only the live body remains, and a second pass finds nothing to do.
    assert_eq!(
        env.workspace_files("wks-A"),
        vec![format!("{}.jar", live.resource_id)]
    );
    assert_eq!(reclaimer.sweep().await.unwrap(), 0);

    let (_, data) = common::download(&env.service, &live.resource_id).await;
    assert_eq!(data, b"live");
}
