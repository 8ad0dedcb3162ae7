// ABOUTME: Scratch database name generation
// ABOUTME: Produces process-unique <prefix>Scratch_<n> names from one atomic counter

use std::sync::atomic::{AtomicU64, Ordering};

const SCRATCH_MARKER: &str = "Scratch_";

/// Shared by every namer in the process so two harnesses never hand out the same name
static SCRATCH_COUNT: AtomicU64 = AtomicU64::new(0);

/// Generates scratch database names under a fixed prefix
#[derive(Debug, Clone)]
pub struct ScratchNamer {
    prefix: String,
}

impl ScratchNamer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Next name, e.g. `TestStore.Scratch_7`
    pub fn next_name(&self) -> String {
        let n = SCRATCH_COUNT.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}{}{}", self.prefix, SCRATCH_MARKER, n)
    }

    /// Whether `name` looks like something this namer produced
    ///
    /// Used to find scratch databases orphaned by killed test processes.
    pub fn is_scratch_name(&self, name: &str) -> bool {
        name.strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix(SCRATCH_MARKER))
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_next_name_follows_pattern() {
        let namer = ScratchNamer::new("TestStore.");
        let name = namer.next_name();

        assert!(name.starts_with("TestStore.Scratch_"));
        assert!(namer.is_scratch_name(&name));
    }

    #[test]
    fn test_names_unique_across_threads_and_namers() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                thread::spawn(|| {
                    // Separate namers with the same prefix still share the counter
                    let namer = ScratchNamer::new("Concurrent.");
                    (0..250).map(|_| namer.next_name()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for name in handle.join().unwrap() {
                assert!(seen.insert(name.clone()), "duplicate scratch name {}", name);
            }
        }
        assert_eq!(seen.len(), 2000);
    }

    #[test]
    fn test_is_scratch_name() {
        let namer = ScratchNamer::new("TestStore.");

        assert!(namer.is_scratch_name("TestStore.Scratch_1"));
        assert!(namer.is_scratch_name("TestStore.Scratch_12345"));
        assert!(!namer.is_scratch_name("TestStore.Scratch_"));
        assert!(!namer.is_scratch_name("TestStore.Scratch_1a"));
        assert!(!namer.is_scratch_name("Other.Scratch_1"));
        assert!(!namer.is_scratch_name("TestStore.northwind"));
    }
}
