use sift_config::SiftConfig;
use sift_ingest::PreprocessorService;
use sift_wire::Shutdown;

pub async fn run(
    config: &SiftConfig,
    shutdown: Shutdown,
) -> Result<(), Box<dyn std::error::Error>> {
    PreprocessorService::new(config).run(shutdown).await?;
    Ok(())
}
