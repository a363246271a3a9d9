//! Integration tests for the upload path: the happy flow, protocol
//! violations, integrity checks, and the all-or-nothing guarantee that a
//! failed upload leaves neither a catalog row nor a backend object.

mod common;

use bytes::Bytes;
use common::{frames, interrupted_frames, setup, upload, upload_header};
use futures::stream;
use resource_store::{
    errors::{ServiceError, ServiceResult},
    models::resource::ResourceStatus,
    services::resource_service::ListRequest,
    transfer::frame::{DigestTrailer, Frame},
};

#[tokio::test]
async fn upload_then_describe_and_download() {
    let env = setup().await;

    let reply = upload(&env.service, "wks-A", "a.jar", 1, b"Hello, world")
        .await
        .unwrap();
    assert!(reply.resource_id.starts_with("res-"));
    // md5("Hello, world")
    assert_eq!(reply.etag, "bc6e6f16b8a077ef5fbc8d59d0b931b9");

    let info = env.service.describe_file(&reply.resource_id).await.unwrap();
    assert_eq!(info.space_id, "wks-A");
    assert_eq!(info.name, "a.jar");
    assert_eq!(info.resource_type, 1);
    assert_eq!(info.size, 12);
    assert_eq!(info.status, ResourceStatus::Enabled);

    let (meta, data) = common::download(&env.service, &reply.resource_id).await;
    assert_eq!(meta.name, "a.jar");
    assert_eq!(meta.size, 12);
    assert_eq!(data, b"Hello, world");
}

#[tokio::test]
async fn upload_accepts_many_body_frames() {
    let env = setup().await;

    let chunks: Vec<Vec<u8>> = (0u8..20).map(|i| vec![i; 1000]).collect();
    let refs: Vec<&[u8]> = chunks.iter().map(Vec::as_slice).collect();
    let header = upload_header("wks-A", "big.jar", 1, 20_000);
    let reply = env
        .service
        .upload_file(frames(&header, &refs))
        .await
        .unwrap();

    let (meta, data) = common::download(&env.service, &reply.resource_id).await;
    assert_eq!(meta.size, 20_000);
    assert_eq!(data, chunks.concat());
}

#[tokio::test]
async fn declared_size_mismatch_leaves_nothing_behind() {
    let env = setup().await;

    let header = upload_header("wks-A", "liar.jar", 1, 100);
    let err = env
        .service
        .upload_file(frames(&header, &[&[0u8; 50]]))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Protocol(_)), "got {err:?}");

    assert!(env.workspace_files("wks-A").is_empty());
    let listed = env
        .service
        .list_resources(ListRequest {
            space_id: "wks-A".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.total, 0);
}

#[tokio::test]
async fn interrupted_stream_leaves_nothing_behind() {
    let env = setup().await;

    let header = upload_header("wks-cancel", "half.jar", 1, 8192);
    let err = env
        .service
        .upload_file(interrupted_frames(&header, &[1u8; 4096]))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Internal(_)), "got {err:?}");

    assert!(env.workspace_files("wks-cancel").is_empty());
    let listed = env
        .service
        .list_resources(ListRequest {
            space_id: "wks-cancel".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.total, 0);
}

#[tokio::test]
async fn data_in_header_frame_is_a_protocol_error() {
    let env = setup().await;

    let header = upload_header("wks-A", "bad.jar", 1, 4);
    let mut first = Frame::with_meta(&header).unwrap();
    first.data = Bytes::from_static(b"oops");
    let items: Vec<ServiceResult<Frame>> = vec![Ok(first)];
    let err = env
        .service
        .upload_file(stream::iter(items))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Protocol(_)), "got {err:?}");
}

#[tokio::test]
async fn invalid_names_are_rejected_before_any_io() {
    let env = setup().await;

    for name in ["bad/name.jar", "bad name.jar", "bad:name", ""] {
        let err = upload(&env.service, "wks-A", name, 1, b"x").await.unwrap_err();
        assert!(
            matches!(&err, ServiceError::InvalidParams(field) if field == "resource_name"),
            "`{name}` got {err:?}"
        );
    }
    assert!(env.workspace_files("wks-A").is_empty());
}

#[tokio::test]
async fn duplicate_name_is_rejected() {
    let env = setup().await;

    upload(&env.service, "wks-A", "a.jar", 1, b"one").await.unwrap();
    let err = upload(&env.service, "wks-A", "a.jar", 1, b"two").await.unwrap_err();
    assert!(matches!(err, ServiceError::ResourceAlreadyExists));

    // Same name under a different type or workspace is fine.
    upload(&env.service, "wks-A", "a.jar", 2, b"two").await.unwrap();
    upload(&env.service, "wks-B", "a.jar", 1, b"two").await.unwrap();
}

#[tokio::test]
async fn concurrent_uploads_of_one_name_elect_a_single_winner() {
    let env = setup().await;

    let mut tasks = Vec::new();
    for i in 0..4 {
        let service = env.service.clone();
        tasks.push(tokio::spawn(async move {
            let body = vec![i as u8; 64];
            upload(&service, "wks-race", "a.jar", 1, &body).await
        }));
    }

    let mut won = 0;
    let mut lost = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => won += 1,
            Err(ServiceError::ResourceAlreadyExists) => lost += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(lost, 3);
    assert_eq!(env.workspace_files("wks-race").len(), 1);
}

#[tokio::test]
async fn md5_trailer_is_verified_when_present() {
    let env = setup().await;

    let header = upload_header("wks-A", "trailed.jar", 1, 12);
    let good: Vec<ServiceResult<Frame>> = vec![
        Ok(Frame::with_meta(&header).unwrap()),
        Ok(Frame::data(Bytes::from_static(b"Hello, world"))),
        Ok(Frame::with_meta(&DigestTrailer {
            md5: "bc6e6f16b8a077ef5fbc8d59d0b931b9".into(),
        })
        .unwrap()),
    ];
    env.service.upload_file(stream::iter(good)).await.unwrap();

    let header = upload_header("wks-A", "mangled.jar", 1, 12);
    let bad: Vec<ServiceResult<Frame>> = vec![
        Ok(Frame::with_meta(&header).unwrap()),
        Ok(Frame::data(Bytes::from_static(b"Hello, world"))),
        Ok(Frame::with_meta(&DigestTrailer {
            md5: "00000000000000000000000000000000".into(),
        })
        .unwrap()),
    ];
    let err = env.service.upload_file(stream::iter(bad)).await.unwrap_err();
    assert!(matches!(err, ServiceError::Protocol(_)), "got {err:?}");

    // Only the good upload's object remains.
    assert_eq!(env.workspace_files("wks-A").len(), 1);
}
