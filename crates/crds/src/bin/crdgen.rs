//! Prints the CustomCluster CRD manifest as YAML.

use crds::CustomCluster;
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&CustomCluster::crd())?);
    Ok(())
}
