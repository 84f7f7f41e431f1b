//! # CRD Generator
//!
//! Prints the `SopsSecret` CustomResourceDefinition as YAML.
//!
//! ```text
//! cargo run --bin crdgen > config/crd/sopssecret.yaml
//! ```

use anyhow::{Context, Result};
use kube::CustomResourceExt;
use sops_operator::crd::SopsSecret;

fn main() -> Result<()> {
    let crd = serde_yaml::to_string(&SopsSecret::crd()).context("Failed to serialize CRD")?;
    print!("{crd}");
    Ok(())
}
