use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    docustitch_cli::main_entry().await
}
