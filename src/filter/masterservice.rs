//! Master service rewrite.
//!
//! The `default/kubernetes` service is pointed at the local proxy so
//! in-cluster clients on the node talk to it instead of the remote server.

use tokio_util::sync::CancellationToken;

use super::object::{Object, Service};
use super::registry::FilterSettings;
use super::{FilterError, ObjectFilter};
use crate::http::request::Verb;

pub const FILTER_NAME: &str = "masterservice";

const MASTER_SERVICE_NAMESPACE: &str = "default";
const MASTER_SERVICE_NAME: &str = "kubernetes";
const MASTER_SERVICE_PORT_NAME: &str = "https";

const SUPPORTED: &[(&str, &[Verb])] = &[("services", &[Verb::List, Verb::Watch, Verb::Get])];

#[derive(Debug, Clone)]
pub struct MasterServiceFilter {
    host: String,
    port: u16,
}

impl MasterServiceFilter {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    pub fn from_settings(settings: &FilterSettings) -> Result<Self, FilterError> {
        Ok(Self::new(settings.master_service_host.clone(), settings.master_service_port))
    }

    fn is_master_service(service: &Service) -> bool {
        service.metadata.as_ref().is_some_and(|meta| {
            meta.name.as_deref() == Some(MASTER_SERVICE_NAME)
                && meta.namespace.as_deref() == Some(MASTER_SERVICE_NAMESPACE)
        })
    }

    fn mutate(&self, mut service: Service) -> Service {
        let Some(spec) = service.spec.as_mut() else {
            return service;
        };

        if spec.cluster_ip.as_deref() != Some(self.host.as_str()) {
            spec.cluster_ip = Some(self.host.clone());
        }

        if self.port != 0 {
            let port = i32::from(self.port);
            for svc_port in spec.ports.iter_mut().flatten() {
                if svc_port.name.as_deref() == Some(MASTER_SERVICE_PORT_NAME) && svc_port.port != Some(port) {
                    svc_port.port = Some(port);
                }
            }
        }
        service
    }
}

impl ObjectFilter for MasterServiceFilter {
    fn name(&self) -> &'static str {
        FILTER_NAME
    }

    fn supported_resource_verbs(&self) -> &'static [(&'static str, &'static [Verb])] {
        SUPPORTED
    }

    fn filter(&self, object: Object, _cancel: &CancellationToken) -> Object {
        match object {
            Object::Service(service) if !self.host.is_empty() && Self::is_master_service(&service) => {
                Object::Service(Box::new(self.mutate(*service)))
            }
            other => other,
        }
    }
}
