use crate::Id;
use std::collections::{HashMap, HashSet};

/// Simple HashMap-based name generator that generates new names for each
/// prefix. Generated names have the shape `prefix_<n>` with a monotonic
/// per-prefix counter.
#[derive(Clone, Debug, Default)]
pub struct NameGenerator {
    name_hash: HashMap<Id, u64>,
    generated_names: HashSet<Id>,
}

impl NameGenerator {
    /// Create a NameGenerator where `names` are already defined so that this
    /// generator will never generate those names.
    pub fn with_prev_defined_names(names: HashSet<Id>) -> Self {
        NameGenerator {
            generated_names: names,
            name_hash: HashMap::default(),
        }
    }

    /// Add names that the generator must avoid.
    pub fn add_names(&mut self, names: HashSet<Id>) {
        self.generated_names.extend(names)
    }

    /// Returns a new name of the form `prefix_<n>`.
    /// For example:
    /// ```
    /// # use cac_utils::NameGenerator;
    /// let mut namegen = NameGenerator::default();
    /// assert_eq!(namegen.gen_name("pipe"), "pipe_0");
    /// assert_eq!(namegen.gen_name("pipe"), "pipe_1");
    /// ```
    pub fn gen_name<S>(&mut self, prefix: S) -> Id
    where
        S: Into<Id>,
    {
        let prefix: Id = prefix.into();
        loop {
            let count = self
                .name_hash
                .entry(prefix)
                .and_modify(|v| *v += 1)
                .or_insert(0);
            let name = Id::from(format!("{}_{}", prefix, count));

            // If we've not seen this name before, return it.
            if !self.generated_names.contains(&name) {
                self.generated_names.insert(name);
                return name;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::NameGenerator;
    use crate::Id;
    use std::collections::HashSet;

    #[test]
    fn counters_are_per_prefix() {
        let mut namegen = NameGenerator::default();
        assert_eq!(namegen.gen_name("a"), "a_0");
        assert_eq!(namegen.gen_name("b"), "b_0");
        assert_eq!(namegen.gen_name("a"), "a_1");
    }

    #[test]
    fn avoids_previously_defined_names() {
        let prev: HashSet<Id> = [Id::from("r_0")].into_iter().collect();
        let mut namegen = NameGenerator::with_prev_defined_names(prev);
        assert_eq!(namegen.gen_name("r"), "r_1");
    }
}
