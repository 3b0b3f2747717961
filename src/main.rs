#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    evoo_cli::cli::run().await
}
