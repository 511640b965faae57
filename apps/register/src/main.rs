//! # Tillpoint Register Entry Point
//!
//! The setup lives in `lib.rs` so it can be tested.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    till_register::run().await
}
