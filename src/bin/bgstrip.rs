//! Background removal CLI tool
//!
//! Command-line interface for removing image backgrounds with the bgstrip
//! library and its ONNX Runtime backend.

#[cfg(feature = "cli")]
use bgstrip::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
