//! # ComputeDomain Spec

use serde::{Deserialize, Serialize};

/// ComputeDomain Custom Resource Definition
///
/// A set of nodes sharing an IMEX domain. The controller keeps exactly one
/// cluster-scoped `DeviceClass` per ComputeDomain, selecting the IMEX
/// channels that belong to it.
///
/// # Example
///
/// ```yaml
/// apiVersion: resource.nvidia.com/v1beta1
/// kind: ComputeDomain
/// metadata:
///   name: training-job
///   namespace: default
/// spec:
///   numNodes: 4
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ComputeDomain",
    group = "resource.nvidia.com",
    version = "v1beta1",
    namespaced,
    shortname = "cd",
    printcolumn = r#"{"name":"Nodes", "type":"integer", "jsonPath":".spec.numNodes"}, {"name":"DeviceClass", "type":"string", "jsonPath":".spec.deviceClassName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ComputeDomainSpec {
    /// Number of nodes expected to join the domain
    pub num_nodes: u32,
    /// Literal name for the DeviceClass
    /// When omitted the name is generated from the ComputeDomain name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class_name: Option<String>,
}
