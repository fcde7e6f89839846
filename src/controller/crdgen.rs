//! # CRD Generator
//!
//! Prints the `ComputeDomain` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > deploy/crds/computedomain.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use compute_domain_controller::crd::ComputeDomain;
use kube::core::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&ComputeDomain::crd())?);
    Ok(())
}
