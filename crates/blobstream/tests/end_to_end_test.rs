//! End-to-end scenarios through the facade crate.

use blobstream::{
    BlobAdapter, BlobError, CollectSink, ContainerConfig, DownloadSink, FileSystemBackend, Locator,
    PipelineErrorKind, UploadOptions, UploadSource,
};
use futures::StreamExt;
use std::sync::Arc;
use tempfile::TempDir;

async fn upload_avatar(adapter: &BlobAdapter, config: &ContainerConfig) -> Result<u64, BlobError> {
    let (source, sender) = UploadSource::new();
    let mut avatar = sender.file("avatar", "avatar.png")?;
    drop(sender);
    let producer = tokio::spawn(async move {
        for _ in 0..4 {
            avatar.send(vec![9u8; 256]).await?;
        }
        Ok::<_, BlobError>(())
    });

    let manifest = adapter
        .upload(config, Some(source), UploadOptions::default())
        .await?;
    producer.await.unwrap()?;
    assert_eq!(manifest.len(), 1);
    assert_eq!(manifest[0].field_name, "avatar");
    Ok(manifest[0].bytes_written)
}

#[tokio::test]
async fn test_upload_then_download_avatar() {
    let dir = TempDir::new().unwrap();
    let adapter = BlobAdapter::new(FileSystemBackend::new(dir.path()).unwrap());
    let config = ContainerConfig::for_container("/photos");

    assert_eq!(upload_avatar(&adapter, &config).await.unwrap(), 1024);

    let stream = adapter.download(&config, "/photos/avatar.png", vec![]);
    let request = stream.request().unwrap().clone();
    assert_eq!(request.container(), "/photos");
    assert_eq!(request.filename(), "avatar.png");

    let mut bytes = Vec::new();
    let mut stream = stream;
    while let Some(chunk) = stream.next().await {
        bytes.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(bytes, vec![9u8; 1024]);
}

#[tokio::test]
async fn test_download_whole_container() {
    let dir = TempDir::new().unwrap();
    let adapter = BlobAdapter::new(FileSystemBackend::new(dir.path()).unwrap());
    let config = ContainerConfig::for_container("/photos");
    upload_avatar(&adapter, &config).await.unwrap();

    let sink = Arc::new(CollectSink::default());
    let stream = adapter.download(
        &config,
        Locator::container("/photos"),
        vec![sink.clone() as Arc<dyn DownloadSink>],
    );
    assert_eq!(stream.request().unwrap().filename(), "*");

    assert_eq!(stream.finished().await.unwrap(), 1024);
    assert_eq!(sink.contents().len(), 1024);
}

#[tokio::test]
async fn test_upload_without_container() {
    let dir = TempDir::new().unwrap();
    let adapter = BlobAdapter::new(FileSystemBackend::new(dir.path()).unwrap());

    let err = upload_avatar(&adapter, &ContainerConfig::default())
        .await
        .unwrap_err();

    assert_eq!(err.pipeline_kind(), Some(&PipelineErrorKind::InvalidContainer));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_registry_from_bundled_config() {
    let dir = TempDir::new().unwrap();
    let (adapter, registry) =
        blobstream::from_config(FileSystemBackend::new(dir.path()).unwrap()).unwrap();
    assert!(registry.names().contains(&"default".to_string()));

    registry.register("photos", ContainerConfig::for_container("/photos"));
    let (source, sender) = UploadSource::new();
    let mut notes = sender.file("notes", "notes.txt").unwrap();
    drop(sender);
    let producer = tokio::spawn(async move { notes.send("hello").await });

    let manifest = adapter
        .upload_with(&registry, "photos", Some(source), UploadOptions::default())
        .await
        .unwrap();
    producer.await.unwrap().unwrap();
    assert_eq!(manifest[0].stored_path, "/photos/notes.txt");

    let total = adapter
        .download_with(&registry, "photos", "/photos/notes.txt", vec![])
        .finished()
        .await
        .unwrap();
    assert_eq!(total, 5);
}
