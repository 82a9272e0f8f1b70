//! Decoded API objects seen by filters.
//!
//! Only the fields filters touch are typed. Everything else is kept in the
//! flattened `rest` maps so an object survives a decode/encode cycle.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An object in a response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Pod(Box<Pod>),
    Service(Box<Service>),
    /// Any other kind, carried verbatim.
    Unknown(Value),
}

impl Object {
    /// Decode a JSON object. `kind_hint` is used when the object carries no
    /// `kind` of its own, as list items do.
    pub fn from_value(value: Value, kind_hint: Option<&str>) -> Self {
        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .or(kind_hint)
            .unwrap_or_default();

        match kind {
            "Pod" => match serde_json::from_value::<Pod>(value.clone()) {
                Ok(pod) => Object::Pod(Box::new(pod)),
                Err(_) => Object::Unknown(value),
            },
            "Service" => match serde_json::from_value::<Service>(value.clone()) {
                Ok(service) => Object::Service(Box::new(service)),
                Err(_) => Object::Unknown(value),
            },
            _ => Object::Unknown(value),
        }
    }

    pub fn into_value(self) -> Result<Value, serde_json::Error> {
        match self {
            Object::Pod(pod) => serde_json::to_value(pod),
            Object::Service(service) => serde_json::to_value(service),
            Object::Unknown(value) => Ok(value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ObjectMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<PodSpec>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containers: Option<Vec<Container>>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<EnvVar>>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ObjectMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<ServiceSpec>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    #[serde(rename = "clusterIP", default, skip_serializing_if = "Option::is_none")]
    pub cluster_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<ServicePort>>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServicePort {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}
