#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = lib_dispatch_perf::init().await {
        eprintln!("❌ dispatch_perf failed: {e:#}");
        std::process::exit(1);
    }
}
