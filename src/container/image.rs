use bollard::container::{Config, DownloadFromContainerOptions, UploadToContainerOptions};
use bollard::image::{CommitContainerOptions, CreateImageOptions};
use futures::StreamExt;
use crate::errors::V2rError;
use crate::utils::short_id;
use super::manager::DockerRuntime;
use tracing::{debug, info};

/// Split `repo[:tag]` into its parts. A colon inside a registry host
/// (`host:5000/repo`) is not a tag separator.
pub fn split_image_reference(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (image, "latest"),
    }
}

impl DockerRuntime {
    /// Pull an image from its registry.
    pub async fn pull(&self, image: &str) -> Result<(), V2rError> {
        let (repo, tag) = split_image_reference(image);
        info!(image = %image, "Pulling image (this may take a while)...");

        let options = CreateImageOptions {
            from_image: repo,
            tag,
            ..Default::default()
        };

        let mut stream = self.docker().create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            match result {
                Ok(progress) => {
                    if let Some(status) = progress.status {
                        debug!(image = %image, status = %status, "Pull progress");
                    }
                }
                Err(e) => {
                    return Err(V2rError::Container(format!("Failed to pull image {}: {}", image, e)));
                }
            }
        }

        info!(image = %image, "Image pulled");
        Ok(())
    }

    /// Commit the container's current state to `repo:tag`.
    pub async fn commit_image(&self, id: &str, repo: &str, tag: &str) -> Result<(), V2rError> {
        let options = CommitContainerOptions {
            container: id,
            repo,
            tag,
            pause: true,
            ..Default::default()
        };

        self.docker().commit_container(options, Config::<String>::default()).await
            .map_err(|e| V2rError::Container(format!("Failed to commit container: {}", e)))?;

        info!(container = %short_id(id), image = %format!("{}:{}", repo, tag), "Container committed");
        Ok(())
    }

    /// Unpack a tar archive into the container at `dest_dir`.
    pub async fn upload_archive(&self, id: &str, dest_dir: &str, archive: Vec<u8>) -> Result<(), V2rError> {
        self.docker().upload_to_container(
            id,
            Some(UploadToContainerOptions {
                path: dest_dir.to_string(),
                ..Default::default()
            }),
            archive.into(),
        ).await
        .map_err(|e| V2rError::Container(format!("Failed to copy file: {}", e)))?;

        Ok(())
    }

    /// Fetch `path` from the container as a tar archive.
    pub async fn download_archive(&self, id: &str, path: &str) -> Result<Vec<u8>, V2rError> {
        let mut stream = self.docker().download_from_container(
            id,
            Some(DownloadFromContainerOptions { path: path.to_string() }),
        );

        let mut data = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| V2rError::Container(format!("Failed to copy {} from container: {}", path, e)))?;
            data.extend_from_slice(&chunk);
        }

        Ok(data)
    }
}
