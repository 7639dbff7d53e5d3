//! PipelineGraph - owns the tasks and the edges between them
//!
//! - Arc<str> ids shared with the tasks, cheap to hand to the runner
//! - predecessors come from the tasks themselves, successors are indexed on insert
//! - `tasks` keeps insertion order, which is a valid topological order

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::error::{EtlError, Result};
use crate::task::Task;

#[derive(Debug, Clone, Default)]
pub struct PipelineGraph {
    name: String,
    tasks: Vec<Arc<Task>>,
    /// task id -> position in `tasks`
    index: HashMap<Arc<str>, usize>,
    /// task id -> direct dependents, in insertion order
    dependents: HashMap<Arc<str>, Vec<Arc<str>>>,
}

impl PipelineGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a task whose dependencies are all already present
    pub fn add_task(&mut self, task: Task) -> Result<()> {
        if self.index.contains_key(task.name()) {
            return Err(EtlError::DuplicateTask {
                name: task.name().to_string(),
            });
        }
        if let Some(missing) = task
            .dependencies()
            .iter()
            .find(|dep| !self.index.contains_key(dep.as_ref()))
        {
            return Err(EtlError::UnknownDependency {
                task: task.name().to_string(),
                dependency: missing.to_string(),
            });
        }

        let id = Arc::clone(task.id());
        for dep in task.dependencies() {
            // reuse the stored key so every id shares one allocation
            if let Some((key, _)) = self.index.get_key_value(dep.as_ref()) {
                self.dependents
                    .entry(Arc::clone(key))
                    .or_default()
                    .push(Arc::clone(&id));
            }
        }
        self.index.insert(Arc::clone(&id), self.tasks.len());
        self.dependents.insert(id, Vec::new());
        self.tasks.push(Arc::new(task));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Task>> {
        self.index.get(name).map(|&i| &self.tasks[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks in topological (insertion) order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.tasks.iter()
    }

    /// Direct upstream tasks
    pub fn dependencies(&self, name: &str) -> &[Arc<str>] {
        match self.get(name) {
            Some(task) => task.dependencies(),
            None => &[],
        }
    }

    /// Direct downstream tasks
    pub fn dependents(&self, name: &str) -> &[Arc<str>] {
        match self.dependents.get(name) {
            Some(ids) => ids.as_slice(),
            None => &[],
        }
    }

    /// Tasks with no dependencies
    pub fn roots(&self) -> Vec<Arc<str>> {
        self.tasks
            .iter()
            .filter(|t| t.dependencies().is_empty())
            .map(|t| Arc::clone(t.id()))
            .collect()
    }

    /// Tasks nothing depends on
    pub fn sinks(&self) -> Vec<Arc<str>> {
        self.tasks
            .iter()
            .filter(|t| self.dependents(t.name()).is_empty())
            .map(|t| Arc::clone(t.id()))
            .collect()
    }

    /// Everything downstream of `name`, in topological order
    pub fn transitive_dependents(&self, name: &str) -> Vec<Arc<str>> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(name);

        while let Some(current) = queue.pop_front() {
            for next in self.dependents(current) {
                if seen.insert(next.as_ref()) {
                    queue.push_back(next.as_ref());
                }
            }
        }

        self.tasks
            .iter()
            .filter(|t| seen.contains(t.name()))
            .map(|t| Arc::clone(t.id()))
            .collect()
    }

    /// Check if there's a path from `from` to `to` (BFS)
    pub fn has_path(&self, from: &str, to: &str) -> bool {
        if from == to {
            return self.contains(from);
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(from);
        visited.insert(from);

        while let Some(current) = queue.pop_front() {
            for neighbor in self.dependents(current) {
                if neighbor.as_ref() == to {
                    return true;
                }
                if visited.insert(neighbor.as_ref()) {
                    queue.push_back(neighbor.as_ref());
                }
            }
        }

        false
    }

    /// Parallel waves: each task sits one layer below its deepest dependency
    pub fn layers(&self) -> Vec<Vec<Arc<str>>> {
        let mut depth: HashMap<&str, usize> = HashMap::with_capacity(self.tasks.len());
        let mut layers: Vec<Vec<Arc<str>>> = Vec::new();

        for task in &self.tasks {
            let level = task
                .dependencies()
                .iter()
                .filter_map(|d| depth.get(d.as_ref()))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(task.name(), level);
            if layers.len() <= level {
                layers.resize_with(level + 1, Vec::new);
            }
            layers[level].push(Arc::clone(task.id()));
        }

        layers
    }
}
