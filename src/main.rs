use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    parley_cli::run_cli().await
}
