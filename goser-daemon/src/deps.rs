//! Dependency-ordered boot resolution.
//!
//! `depends_on` edges order the start sequence only; they do not gate on a
//! dependency being healthy. Unknown dependencies are dropped (the edge is
//! advisory), and services caught in a cycle are excluded from the order
//! so the caller can skip their auto-start.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::ServiceConfig;

/// Result of resolving the boot order.
#[derive(Debug, Default)]
pub struct StartOrder {
    /// Services in dependency-respecting order (dependencies first).
    pub order: Vec<String>,
    /// Services excluded because they participate in a dependency cycle.
    pub skipped: Vec<String>,
    /// `(service, dependency)` pairs whose dependency is not registered.
    pub unknown: Vec<(String, String)>,
}

/// Kahn's algorithm over the `depends_on` graph. Ties break
/// alphabetically so the order is deterministic regardless of
/// registration order.
pub fn start_order(services: &HashMap<String, ServiceConfig>) -> StartOrder {
    let known: HashSet<&str> = services.keys().map(String::as_str).collect();

    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut unknown = Vec::new();

    for name in services.keys() {
        in_degree.insert(name, 0);
        dependents.insert(name, Vec::new());
    }

    for (name, cfg) in services {
        for dep in &cfg.depends_on {
            if !known.contains(dep.as_str()) {
                unknown.push((name.clone(), dep.clone()));
                continue;
            }
            *in_degree.get_mut(name.as_str()).expect("registered above") += 1;
            dependents
                .get_mut(dep.as_str())
                .expect("registered above")
                .push(name);
        }
    }

    let mut roots: Vec<&str> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(name, _)| *name)
        .collect();
    roots.sort_unstable();
    let mut queue: VecDeque<&str> = roots.into();

    let mut order = Vec::with_capacity(services.len());
    while let Some(node) = queue.pop_front() {
        order.push(node.to_string());
        let mut released: Vec<&str> = Vec::new();
        for &dependent in &dependents[node] {
            let deg = in_degree.get_mut(dependent).expect("registered above");
            *deg -= 1;
            if *deg == 0 {
                released.push(dependent);
            }
        }
        released.sort_unstable();
        for dependent in released {
            let at = queue.partition_point(|queued| *queued < dependent);
            queue.insert(at, dependent);
        }
    }

    // Whatever never reached in-degree zero sits in a cycle.
    let ordered: HashSet<&str> = order.iter().map(String::as_str).collect();
    let mut skipped: Vec<String> = services
        .keys()
        .filter(|name| !ordered.contains(name.as_str()))
        .cloned()
        .collect();
    skipped.sort_unstable();

    StartOrder {
        order,
        skipped,
        unknown,
    }
}
