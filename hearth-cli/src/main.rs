use anyhow::Result;
use hearth_cli::app;

#[tokio::main]
async fn main() -> Result<()> {
    app::run().await
}
