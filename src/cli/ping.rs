use crate::cli::commands::PingArgs;
use crate::container::{ContainerRuntime, DockerRuntime};
use crate::errors::V2rError;
use tracing::info;

pub async fn handle_ping(args: PingArgs) -> Result<(), V2rError> {
    let config = super::load(args.config.as_deref()).await?;
    let runtime = DockerRuntime::connect()?;
    runtime.ping().await?;

    let image = config.isolation().image.unwrap_or_else(|| crate::config::DEFAULT_IMAGE.to_string());
    info!(runtime = runtime.runtime_name(), image = %image, "Container runtime reachable");
    println!("{} is reachable (base image: {})", runtime.runtime_name(), image);
    Ok(())
}
