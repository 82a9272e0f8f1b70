//! Filter registry.
//!
//! Populated at startup and then used read-only by every request task.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::masterservice::{self, MasterServiceFilter};
use super::podenv::{self, PodEnvFilter};
use super::{FilterError, Object, ObjectFilter};
use crate::config::FilterConfig;
use crate::http::request::Verb;

/// Inputs filters are built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSettings {
    pub master_service_host: String,
    pub master_service_port: u16,
}

impl From<&FilterConfig> for FilterSettings {
    fn from(config: &FilterConfig) -> Self {
        Self {
            master_service_host: config.master_service_host.clone(),
            master_service_port: config.master_service_port,
        }
    }
}

/// Constructor for a registered filter.
pub type FilterFactory =
    Box<dyn Fn(&FilterSettings) -> Result<Arc<dyn ObjectFilter>, FilterError> + Send + Sync>;

/// Box a typed constructor as a [`FilterFactory`].
pub fn factory<F, T>(build: F) -> FilterFactory
where
    F: Fn(&FilterSettings) -> Result<T, FilterError> + Send + Sync + 'static,
    T: ObjectFilter + 'static,
{
    Box::new(move |settings: &FilterSettings| -> Result<Arc<dyn ObjectFilter>, FilterError> {
        Ok(Arc::new(build(settings)?) as Arc<dyn ObjectFilter>)
    })
}

/// Name-keyed filter factories.
pub struct FilterRegistry {
    factories: Vec<(String, FilterFactory)>,
    disabled: HashSet<String>,
}

impl FilterRegistry {
    /// An empty registry; `disabled` names are never built.
    pub fn new<I, S>(disabled: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            factories: Vec::new(),
            disabled: disabled.into_iter().map(Into::into).collect(),
        }
    }

    /// A registry holding every built-in filter.
    pub fn with_builtins<I, S>(disabled: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::new(disabled);
        registry.register(masterservice::FILTER_NAME, factory(MasterServiceFilter::from_settings));
        registry.register(podenv::FILTER_NAME, factory(PodEnvFilter::from_settings));
        registry
    }

    /// Register a factory. A later registration under the same name replaces the earlier one.
    pub fn register(&mut self, name: impl Into<String>, factory: FilterFactory) {
        let name = name.into();
        if let Some(slot) = self.factories.iter_mut().find(|(n, _)| *n == name) {
            tracing::warn!(filter = %name, "Filter registered twice, keeping the latest");
            slot.1 = factory;
        } else {
            tracing::debug!(filter = %name, "Registered filter");
            self.factories.push((name, factory));
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.iter().any(|(n, _)| n == name)
    }

    /// Registered and not disabled.
    pub fn enabled(&self, name: &str) -> bool {
        self.is_registered(name) && !self.disabled.contains(name)
    }

    /// Build every enabled filter once.
    pub fn build(&self, settings: &FilterSettings) -> Result<Arc<FilterSet>, FilterError> {
        let mut filters = Vec::new();
        for (name, factory) in &self.factories {
            if self.disabled.contains(name) {
                tracing::info!(filter = %name, "Filter disabled");
                continue;
            }
            filters.push(factory(settings)?);
            tracing::info!(filter = %name, "Filter enabled");
        }
        Ok(Arc::new(FilterSet { filters }))
    }
}

/// Built filters, in registration order.
#[derive(Clone, Default)]
pub struct FilterSet {
    filters: Vec<Arc<dyn ObjectFilter>>,
}

impl FilterSet {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Filters eligible for a resource and verb.
    pub fn chain_for(&self, resource: &str, verb: Verb) -> FilterChain {
        FilterChain {
            filters: self
                .filters
                .iter()
                .filter(|f| f.supports(resource, verb))
                .cloned()
                .collect(),
        }
    }
}

/// The filters applied to one response.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn ObjectFilter>>,
}

impl FilterChain {
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Run every filter in order. A cancelled request gets the object back as is.
    pub fn apply(&self, object: Object, cancel: &CancellationToken) -> Object {
        self.filters.iter().fold(object, |object, filter| {
            if cancel.is_cancelled() {
                object
            } else {
                filter.filter(object, cancel)
            }
        })
    }
}
