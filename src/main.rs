#[tokio::main]
async fn main() -> anyhow::Result<()> {
    codejudge::engine::run().await
}
