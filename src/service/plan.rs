//! Dependency-ordered install plan.

use std::collections::{HashMap, HashSet};

use crate::error::OrchestrationError;

use super::spec::ServiceSpec;

/// Services in the order they are installed and started.
///
/// Built once per run with a stable topological sort: among services whose
/// dependencies are already placed, the one declared first goes next.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallPlan {
    services: Vec<ServiceSpec>,
}

impl InstallPlan {
    /// Order `specs` by `depends_on`.
    ///
    /// Fails on duplicate names, dependencies outside the set, and cycles.
    pub fn new(specs: Vec<ServiceSpec>) -> Result<Self, OrchestrationError> {
        let mut seen = HashSet::new();
        for spec in &specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(OrchestrationError::InvalidPlan(format!(
                    "duplicate service '{}'",
                    spec.name
                )));
            }
        }
        for spec in &specs {
            for dep in &spec.depends_on {
                if dep == &spec.name {
                    return Err(OrchestrationError::InvalidPlan(format!(
                        "service '{}' depends on itself",
                        spec.name
                    )));
                }
                if !seen.contains(dep.as_str()) {
                    return Err(OrchestrationError::InvalidPlan(format!(
                        "service '{}' depends on unknown service '{}'",
                        spec.name, dep
                    )));
                }
            }
        }

        let mut pending: Vec<ServiceSpec> = specs;
        let mut placed: HashSet<String> = HashSet::new();
        let mut ordered = Vec::with_capacity(pending.len());

        while !pending.is_empty() {
            let ready = pending
                .iter()
                .position(|s| s.depends_on.iter().all(|d| placed.contains(d)));
            match ready {
                Some(idx) => {
                    let spec = pending.remove(idx);
                    placed.insert(spec.name.clone());
                    ordered.push(spec);
                }
                None => {
                    let names: Vec<&str> = pending.iter().map(|s| s.name.as_str()).collect();
                    return Err(OrchestrationError::InvalidPlan(format!(
                        "dependency cycle among: {}",
                        names.join(", ")
                    )));
                }
            }
        }

        Ok(Self { services: ordered })
    }

    pub fn services(&self) -> &[ServiceSpec] {
        &self.services
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceSpec> {
        self.services.iter()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Service names in plan order.
    pub fn names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name.as_str()).collect()
    }

    /// Restrict the plan to `names` plus everything they transitively depend on.
    pub fn subset(&self, names: &[String]) -> Result<Self, OrchestrationError> {
        let by_name: HashMap<&str, &ServiceSpec> =
            self.services.iter().map(|s| (s.name.as_str(), s)).collect();
        let mut wanted: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = Vec::new();
        for name in names {
            if !by_name.contains_key(name.as_str()) {
                return Err(OrchestrationError::InvalidPlan(format!(
                    "unknown service '{}'",
                    name
                )));
            }
            stack.push(name.as_str());
        }
        while let Some(name) = stack.pop() {
            if wanted.insert(name) {
                if let Some(spec) = by_name.get(name) {
                    stack.extend(spec.depends_on.iter().map(String::as_str));
                }
            }
        }
        Ok(Self {
            services: self
                .services
                .iter()
                .filter(|s| wanted.contains(s.name.as_str()))
                .cloned()
                .collect(),
        })
    }
}
