//! Dependency validation, cycle detection, and load-order resolution.

use std::collections::HashSet;

use crate::error::{PluginError, PluginResult};
use crate::manifest::Manifest;
use crate::registry::Registry;

/// Validates and orders plugin dependencies against a [`Registry`].
pub struct DependencyResolver<'a> {
    registry: &'a Registry,
}

impl<'a> DependencyResolver<'a> {
    /// Build a resolver over `registry`.
    pub fn new(registry: &'a Registry) -> Self {
        DependencyResolver { registry }
    }

    /// Check that every non-optional dependency of `manifest` exists in the
    /// registry at a compatible version, and that no currently-loaded
    /// plugin conflicts with it.
    pub fn check_dependencies(&self, manifest: &Manifest) -> PluginResult<()> {
        for dep in &manifest.dependencies {
            if dep.optional {
                continue;
            }
            let entry = self.registry.get(&dep.plugin_id).map_err(|_| {
                PluginError::MissingDependency {
                    id: manifest.id.clone(),
                    dependency_id: dep.plugin_id.clone(),
                }
            })?;

            let constraint = dep.constraint()?;
            if !constraint.satisfied_by(&entry.manifest.version) {
                return Err(PluginError::IncompatibleVersion {
                    id: manifest.id.clone(),
                    reason: format!(
                        "dependency '{}' at {} does not satisfy {}",
                        dep.plugin_id, entry.manifest.version, dep.version_constraint
                    ),
                });
            }
        }

        for id in self.registry.all_ids() {
            if !manifest.conflicts_with.contains(&id) {
                continue;
            }
            if let Ok(entry) = self.registry.get(&id) {
                if entry.loaded {
                    return Err(PluginError::ConflictingPlugin {
                        id: manifest.id.clone(),
                        conflicting_id: id,
                    });
                }
            }
        }

        Ok(())
    }

    /// Produce a topological load order for `plugin_ids` via post-order DFS,
    /// visiting non-optional dependencies first. Tie-breaking is input order.
    pub fn resolve_load_order(&self, plugin_ids: &[String]) -> PluginResult<Vec<String>> {
        let mut temporary: HashSet<String> = HashSet::new();
        let mut permanent: HashSet<String> = HashSet::new();
        let mut order: Vec<String> = Vec::new();

        for id in plugin_ids {
            self.visit(id, &mut temporary, &mut permanent, &mut order)?;
        }

        Ok(order)
    }

    fn visit(
        &self,
        id: &str,
        temporary: &mut HashSet<String>,
        permanent: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) -> PluginResult<()> {
        if permanent.contains(id) {
            return Ok(());
        }
        if temporary.contains(id) {
            return Err(PluginError::CircularDependency { id: id.to_string() });
        }

        let entry = self
            .registry
            .get(id)
            .map_err(|_| PluginError::MissingDependency {
                id: id.to_string(),
                dependency_id: id.to_string(),
            })?;

        temporary.insert(id.to_string());

        for dep in &entry.manifest.dependencies {
            if dep.optional {
                continue;
            }
            self.visit(&dep.plugin_id, temporary, permanent, order)?;
        }

        temporary.remove(id);
        permanent.insert(id.to_string());
        order.push(id.to_string());

        Ok(())
    }

    /// A lightweight recursion-stack DFS that only reports whether a cycle
    /// exists, without building a load order. Must agree with
    /// [`Self::resolve_load_order`]'s failure verdict for the same inputs.
    pub fn detect_cycles(&self, plugin_ids: &[String]) -> bool {
        let mut temporary: HashSet<String> = HashSet::new();
        let mut permanent: HashSet<String> = HashSet::new();

        for id in plugin_ids {
            if self.has_cycle_from(id, &mut temporary, &mut permanent) {
                return true;
            }
        }
        false
    }

    fn has_cycle_from(
        &self,
        id: &str,
        temporary: &mut HashSet<String>,
        permanent: &mut HashSet<String>,
    ) -> bool {
        if permanent.contains(id) {
            return false;
        }
        if temporary.contains(id) {
            return true;
        }

        let entry = match self.registry.get(id) {
            Ok(entry) => entry,
            Err(_) => return false,
        };

        temporary.insert(id.to_string());

        for dep in &entry.manifest.dependencies {
            if dep.optional {
                continue;
            }
            if self.has_cycle_from(&dep.plugin_id, temporary, permanent) {
                return true;
            }
        }

        temporary.remove(id);
        permanent.insert(id.to_string());
        false
    }
}
