#[tokio::main]
async fn main() -> std::process::ExitCode {
    anchorplay_lib::run().await
}
