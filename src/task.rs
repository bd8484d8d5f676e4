//! Task registry consulted by every virtual user on each scheduling tick.
//!
//! A task is a named, weighted unit of work. Users pick one task per
//! iteration with probability proportional to its weight and run it to
//! completion before checking whether to stop.

use crate::error::RegistryError;
use crate::user::VirtualUser;
use rand::Rng;
use std::sync::Arc;

#[async_trait::async_trait]
pub trait Task: Send + Sync {
    /// Run one iteration on behalf of `user`. Outcomes are recorded by the user, not returned.
    async fn run(&self, user: &VirtualUser);
}

pub struct RegisteredTask {
    name: String,
    weight: u32,
    task: Arc<dyn Task>,
}

impl RegisteredTask {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn task(&self) -> &Arc<dyn Task> {
        &self.task
    }
}

#[derive(Default)]
pub struct TaskRegistry {
    tasks: Vec<RegisteredTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(
        &mut self,
        name: impl Into<String>,
        weight: u32,
        task: T,
    ) -> Result<&mut Self, RegistryError>
    where
        T: Task + 'static,
    {
        let name = name.into();
        if weight == 0 {
            return Err(RegistryError::ZeroWeight(name));
        }
        if self.tasks.iter().any(|t| t.name == name) {
            return Err(RegistryError::Duplicate(name));
        }

        self.tasks.push(RegisteredTask {
            name,
            weight,
            task: Arc::new(task),
        });
        Ok(self)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Pick a task with probability proportional to its weight.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&RegisteredTask> {
        let total: u64 = self.tasks.iter().map(|t| u64::from(t.weight)).sum();
        if total == 0 {
            return None;
        }

        let mut point = rng.gen_range(0..total);
        for task in &self.tasks {
            let weight = u64::from(task.weight);
            if point < weight {
                return Some(task);
            }
            point -= weight;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Noop;

    #[async_trait::async_trait]
    impl Task for Noop {
        async fn run(&self, _user: &VirtualUser) {}
    }

    #[test]
    fn test_register_rejects_duplicates_and_zero_weight() {
        let mut registry = TaskRegistry::new();
        registry.register("a", 1, Noop).unwrap();

        assert_eq!(
            registry.register("a", 2, Noop).err(),
            Some(RegistryError::Duplicate("a".to_string()))
        );
        assert_eq!(
            registry.register("b", 0, Noop).err(),
            Some(RegistryError::ZeroWeight("b".to_string()))
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_choose_empty() {
        let registry = TaskRegistry::new();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(registry.is_empty());
        assert!(registry.choose(&mut rng).is_none());
    }

    #[test]
    fn test_choose_follows_weights() {
        let mut registry = TaskRegistry::new();
        registry
            .register("heavy", 9, Noop)
            .unwrap()
            .register("light", 1, Noop)
            .unwrap();

        let mut rng = StdRng::seed_from_u64(42);
        let mut heavy = 0;
        let mut light = 0;
        for _ in 0..10_000 {
            match registry.choose(&mut rng).map(|t| t.name()) {
                Some("heavy") => heavy += 1,
                Some("light") => light += 1,
                other => panic!("unexpected choice {:?}", other),
            }
        }

        assert!(light > 500 && light < 1500, "light picked {} times", light);
        assert_eq!(heavy + light, 10_000);
    }
}
