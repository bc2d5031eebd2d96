use hemmer_provider_azuredevops::{init_logging, serve, AzureDevOpsProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Azure DevOps provider");
    serve(AzureDevOpsProvider::new()).await
}
