#[tokio::main]
async fn main() {
    if let Err(e) = akshaya_lib::run().await {
        tracing::error!("Portal server failed: {e}");
        eprintln!("akshaya-server: {e}");
        std::process::exit(1);
    }
}
