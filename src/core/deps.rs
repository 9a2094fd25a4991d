//! Cross-queue dependency ordering.
//!
//! A [`DependencyGraph`] records, for each queue, the queues that must be
//! idle before it may run, together with the reverse index used to cascade
//! suspend and resume. The graph is static: it is built once from
//! configuration and checked for cycles up front, so the scheduler never
//! has to detect cycles at runtime.

use std::collections::HashMap;
use thiserror::Error;

use super::types::{NameError, QueueName};

/// Errors that can occur when building a dependency graph.
#[derive(Debug, Error)]
pub enum DepsError {
    /// A queue or dependency name failed validation.
    #[error(transparent)]
    InvalidName(#[from] NameError),

    /// The declared dependencies contain a cycle.
    #[error("dependency cycle detected involving queue: {0}")]
    CycleDetected(QueueName),
}

/// Static precedence relation between queues.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// queue -> queues it depends on.
    dependencies: HashMap<QueueName, Vec<QueueName>>,
    /// queue -> queues that depend on it.
    dependants: HashMap<QueueName, Vec<QueueName>>,
}

impl DependencyGraph {
    /// Build a graph from `(queue, dependencies)` pairs.
    ///
    /// Every name is validated, the reverse index is derived, and the result
    /// is rejected if the forward edges contain a cycle.
    pub fn new<I, D>(pairs: I) -> Result<Self, DepsError>
    where
        I: IntoIterator<Item = (String, D)>,
        D: IntoIterator<Item = String>,
    {
        let mut dependencies: HashMap<QueueName, Vec<QueueName>> = HashMap::new();
        let mut dependants: HashMap<QueueName, Vec<QueueName>> = HashMap::new();

        for (name, deps) in pairs {
            let queue = QueueName::parse(&name)?;
            let entry = dependencies.entry(queue.clone()).or_default();
            for dep in deps {
                let dep = QueueName::parse(&dep)?;
                dependants
                    .entry(dep.clone())
                    .or_default()
                    .push(queue.clone());
                entry.push(dep);
            }
        }

        let graph = Self {
            dependencies,
            dependants,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// An empty graph: no queue depends on any other.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The queues `queue` depends on.
    pub fn dependencies_of(&self, queue: &QueueName) -> &[QueueName] {
        self.dependencies
            .get(queue)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// The queues that depend on `queue`.
    pub fn dependants_of(&self, queue: &QueueName) -> &[QueueName] {
        self.dependants
            .get(queue)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Whether `queue` is held back by a dependency that still has work.
    ///
    /// `has_work` reports whether a queue name is currently live in the
    /// queue table.
    pub fn is_blocked(&self, queue: &QueueName, has_work: impl Fn(&QueueName) -> bool) -> bool {
        self.dependencies_of(queue).iter().any(has_work)
    }

    /// DFS over the forward edges from every declared queue; the first
    /// back-edge fails the build.
    fn check_acyclic(&self) -> Result<(), DepsError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit(
            graph: &DependencyGraph,
            queue: &QueueName,
            marks: &mut HashMap<QueueName, Mark>,
        ) -> Result<(), DepsError> {
            match marks.get(queue) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => return Err(DepsError::CycleDetected(queue.clone())),
                None => {}
            }
            marks.insert(queue.clone(), Mark::Visiting);
            for dep in graph.dependencies_of(queue) {
                visit(graph, dep, marks)?;
            }
            marks.insert(queue.clone(), Mark::Done);
            Ok(())
        }

        let mut marks = HashMap::new();
        for queue in self.dependencies.keys() {
            visit(self, queue, &mut marks)?;
        }
        Ok(())
    }
}
