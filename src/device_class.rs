//! # DeviceClass
//!
//! The derived object kept per ComputeDomain: a cluster-scoped
//! `resource.k8s.io` DeviceClass selecting the IMEX channels of one domain.

use crate::manager::{DerivedObjectManager, DerivedTemplate, Owner};
use k8s_openapi::api::resource::v1beta1::{
    CELDeviceSelector, DeviceClass, DeviceClassSpec, DeviceSelector,
};

/// Manager specialised to DeviceClass objects
pub type DeviceClassManager = DerivedObjectManager<DeviceClass>;

/// Builds the DeviceClass body for a ComputeDomain
#[derive(Debug, Clone)]
pub struct DeviceClassTemplate {
    driver_name: String,
}

impl DeviceClassTemplate {
    pub fn new(driver_name: impl Into<String>) -> Self {
        Self {
            driver_name: driver_name.into(),
        }
    }

    /// CEL expressions matching IMEX channels of the domain `owner_uid`
    pub fn selector_expressions(&self, owner_uid: &str) -> Vec<String> {
        let driver = &self.driver_name;
        vec![
            format!("device.driver == '{driver}'"),
            format!("device.attributes['{driver}'].type == 'imex-channel'"),
            format!("device.attributes['{driver}'].domain == '{owner_uid}'"),
        ]
    }
}

impl DerivedTemplate<DeviceClass> for DeviceClassTemplate {
    fn build(&self, owner: &Owner) -> DeviceClass {
        let selectors = self
            .selector_expressions(&owner.uid)
            .into_iter()
            .map(|expression| DeviceSelector {
                cel: Some(CELDeviceSelector { expression }),
            })
            .collect();

        DeviceClass {
            metadata: Default::default(),
            spec: DeviceClassSpec {
                selectors: Some(selectors),
                ..Default::default()
            },
        }
    }
}
