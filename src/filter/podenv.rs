//! Pod environment rewrite.
//!
//! Points `KUBERNETES_SERVICE_HOST` of every container at the configured
//! master service host, so workloads on the node reach the API server
//! through the local proxy.

use tokio_util::sync::CancellationToken;

use super::object::{Object, Pod};
use super::registry::FilterSettings;
use super::{FilterError, ObjectFilter};
use crate::http::request::Verb;

pub const FILTER_NAME: &str = "podenvupdater";

const SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";

const SUPPORTED: &[(&str, &[Verb])] = &[("pods", &[Verb::List, Verb::Watch, Verb::Get, Verb::Patch])];

#[derive(Debug, Clone)]
pub struct PodEnvFilter {
    host: String,
}

impl PodEnvFilter {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub fn from_settings(settings: &FilterSettings) -> Result<Self, FilterError> {
        Ok(Self::new(settings.master_service_host.clone()))
    }

    fn mutate(&self, mut pod: Pod) -> Pod {
        let containers = pod.spec.as_mut().and_then(|spec| spec.containers.as_mut());
        for container in containers.into_iter().flatten() {
            let Some(env) = container.env.as_mut() else {
                continue;
            };
            if let Some(var) = env.iter_mut().find(|var| var.name == SERVICE_HOST_ENV) {
                if var.value.as_deref() != Some(self.host.as_str()) {
                    var.value = Some(self.host.clone());
                }
            }
        }
        pod
    }
}

impl ObjectFilter for PodEnvFilter {
    fn name(&self) -> &'static str {
        FILTER_NAME
    }

    fn supported_resource_verbs(&self) -> &'static [(&'static str, &'static [Verb])] {
        SUPPORTED
    }

    fn filter(&self, object: Object, _cancel: &CancellationToken) -> Object {
        match object {
            Object::Pod(pod) if !self.host.is_empty() => Object::Pod(Box::new(self.mutate(*pod))),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn pod(containers: Value) -> Object {
        Object::from_value(
            json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "web-0"}, "spec": {"containers": containers}}),
            None,
        )
    }

    fn run(filter: &PodEnvFilter, object: Object) -> Value {
        filter.filter(object, &CancellationToken::new()).into_value().unwrap()
    }

    #[test]
    fn supported_resources() {
        let filter = PodEnvFilter::new("169.254.2.1");
        assert!(filter.supports("pods", Verb::Watch));
        assert!(filter.supports("pods", Verb::Patch));
        assert!(!filter.supports("pods", Verb::Create));
        assert!(!filter.supports("services", Verb::List));
    }

    #[test]
    fn rewrites_every_container() {
        let filter = PodEnvFilter::new("169.254.2.1");
        let out = run(
            &filter,
            pod(json!([
                {"name": "a", "env": [{"name": "KUBERNETES_SERVICE_HOST", "value": "10.0.0.1"}, {"name": "OTHER", "value": "x"}]},
                {"name": "b", "env": [{"name": "KUBERNETES_SERVICE_HOST", "value": "10.0.0.1"}]},
                {"name": "c"}
            ])),
        );

        assert_eq!(out["spec"]["containers"][0]["env"][0]["value"], "169.254.2.1");
        assert_eq!(out["spec"]["containers"][0]["env"][1]["value"], "x");
        assert_eq!(out["spec"]["containers"][1]["env"][0]["value"], "169.254.2.1");
        assert!(out["spec"]["containers"][2].get("env").is_none());
    }

    #[test]
    fn idempotent() {
        let filter = PodEnvFilter::new("169.254.2.1");
        let input = pod(json!([{"name": "a", "env": [{"name": "KUBERNETES_SERVICE_HOST", "value": "10.0.0.1"}]}]));
        let once = filter.filter(input, &CancellationToken::new());
        let twice = filter.filter(once.clone(), &CancellationToken::new());
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_host_and_other_kinds_pass_through() {
        let input = pod(json!([{"name": "a", "env": [{"name": "KUBERNETES_SERVICE_HOST", "value": "10.0.0.1"}]}]));
        assert_eq!(PodEnvFilter::new("").filter(input.clone(), &CancellationToken::new()), input);

        let node = Object::from_value(json!({"kind": "Node", "metadata": {"name": "node-1"}}), None);
        assert_eq!(PodEnvFilter::new("169.254.2.1").filter(node.clone(), &CancellationToken::new()), node);
    }
}
