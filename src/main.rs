//! Binary entry point for the payment gateway client.
//!
//! The runtime logic lives in `paygate::runtime`, so this binary only
//! delegates to the shared library code.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> { paygate::runtime::run().await }
