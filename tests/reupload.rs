//! Integration tests for in-place body replacement: temp-then-rename on
//! success, and a live object untouched by any failure.

mod common;

use common::{setup, upload};
use futures::stream;
use resource_store::{
    errors::{ServiceError, ServiceResult},
    transfer::frame::{Frame, ReUploadHeader},
};

fn reupload_frames(
    resource_id: &str,
    space_id: &str,
    data: &[u8],
    declared_size: i64,
) -> impl futures::Stream<Item = ServiceResult<Frame>> + Send + Unpin + 'static {
    let header = ReUploadHeader {
        resource_id: resource_id.into(),
        space_id: space_id.into(),
        size: declared_size,
    };
    let items: Vec<ServiceResult<Frame>> = vec![
        Ok(Frame::with_meta(&header).unwrap()),
        Ok(Frame::data(bytes::Bytes::copy_from_slice(data))),
    ];
    stream::iter(items)
}

#[tokio::test]
async fn reupload_replaces_body_and_size() {
    let env = setup().await;

    let reply = upload(&env.service, "wks-A", "a.jar", 1, b"0123456789")
        .await
        .unwrap();
    let before = env.service.describe_file(&reply.resource_id).await.unwrap();
    assert_eq!(before.size, 10);

    let body = b"abcdefghijklmnopqrst";
    env.service
        .re_upload_file(reupload_frames(&reply.resource_id, "wks-A", body, 20))
        .await
        .unwrap();

    let after = env.service.describe_file(&reply.resource_id).await.unwrap();
    assert_eq!(after.size, 20);
    assert_eq!(after.name, "a.jar");

    let (meta, data) = common::download(&env.service, &reply.resource_id).await;
    assert_eq!(meta.size, 20);
    assert_eq!(data, body);

    // No temporary left behind.
    assert_eq!(env.workspace_files("wks-A").len(), 1);
}

#[tokio::test]
async fn failed_reupload_leaves_the_original_intact() {
    let env = setup().await;

    let reply = upload(&env.service, "wks-A", "a.jar", 1, b"original bytes")
        .await
        .unwrap();

    // Declared 50 bytes, sent 20: the stream is rejected.
    let err = env
        .service
        .re_upload_file(reupload_frames(
            &reply.resource_id,
            "wks-A",
            b"abcdefghijklmnopqrst",
            50,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Protocol(_)), "got {err:?}");

    let info = env.service.describe_file(&reply.resource_id).await.unwrap();
    assert_eq!(info.size, 14);
    let (_, data) = common::download(&env.service, &reply.resource_id).await;
    assert_eq!(data, b"original bytes");
    assert_eq!(env.workspace_files("wks-A").len(), 1);
}

#[tokio::test]
async fn reupload_of_missing_resource_is_not_exists() {
    let env = setup().await;

    let err = env
        .service
        .re_upload_file(reupload_frames("res-missing", "wks-A", b"xx", 2))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ResourceNotExists(_)));
}

#[tokio::test]
async fn reupload_is_scoped_to_the_workspace() {
    let env = setup().await;

    let reply = upload(&env.service, "wks-A", "a.jar", 1, b"data").await.unwrap();
    let err = env
        .service
        .re_upload_file(reupload_frames(&reply.resource_id, "wks-other", b"data", 4))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ResourceNotExists(_)));
}
