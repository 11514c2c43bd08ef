use crate::statistics::LookupStats;
use crate::symmetries::{Group, SymmetricalLookups};
use orbit_planning::{State, StateRegistry, Task};
use std::rc::Rc;
use thiserror::Error;

/// Heuristic estimate of the goal distance of a state.
///
/// The ordering puts `DeadEnd` above every finite value, so "strongest
/// estimate" is simply the maximum.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Estimate {
    Finite(i32),
    DeadEnd,
}

/// An opaque goal-distance estimator. Implementations may keep internal
/// caches, hence the mutable receiver.
pub trait Heuristic {
    fn compute_heuristic(&mut self, state: &State, task: &Task) -> Estimate;
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("symmetrical lookups heuristic constructed over a group with lookups disabled")]
    LookupsDisabled,
}

/// Wraps a heuristic so that each evaluation also consults symmetric images
/// of the state and returns the strongest value found.
///
/// A dead end on any image makes the wrapped state a dead end: symmetric
/// states have identical goal distances.
pub struct SymmetricalLookupsHeuristic {
    component: Box<dyn Heuristic>,
    group: Rc<Group>,
    stats: Rc<LookupStats>,
}

impl SymmetricalLookupsHeuristic {
    pub fn new(
        component: Box<dyn Heuristic>,
        group: Rc<Group>,
        stats: Rc<LookupStats>,
    ) -> Result<SymmetricalLookupsHeuristic, ConfigError> {
        if group.symmetrical_lookups() == SymmetricalLookups::None {
            return Err(ConfigError::LookupsDisabled);
        }
        assert!(
            group.is_initialized(),
            "symmetries must be computed before wrapping a heuristic"
        );
        stats.reset();
        Ok(SymmetricalLookupsHeuristic {
            component,
            group,
            stats,
        })
    }
}

impl Heuristic for SymmetricalLookupsHeuristic {
    fn compute_heuristic(&mut self, state: &State, task: &Task) -> Estimate {
        let mut value = self.component.compute_heuristic(state, task);
        if !self.group.has_symmetries() || value == Estimate::DeadEnd {
            return value;
        }
        // the lookup registry is scratch space: symmetric images must not
        // leak into the search space
        let mut lookup_registry = StateRegistry::new(task);
        let mut symmetrical_states = Vec::new();
        self.group
            .compute_symmetric_states(state, &mut lookup_registry, &mut symmetrical_states);

        let previous = value;
        for symmetrical in &symmetrical_states {
            let estimate = self.component.compute_heuristic(symmetrical, task);
            if estimate == Estimate::DeadEnd {
                self.stats.count_improving_state();
                value = Estimate::DeadEnd;
                break;
            }
            if estimate > previous {
                self.stats.count_improving_state();
            }
            if estimate > value {
                value = estimate;
            }
        }
        self.stats.add_generated_states(symmetrical_states.len());
        if value > previous {
            self.stats.count_improved_evaluation();
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetries::{ReplayEngine, SymmetryOptions};
    use hashbrown::HashMap;
    use orbit_planning::FactPair;

    /// Looks estimates up in a fixed table; everything absent is a dead end.
    struct TableHeuristic(HashMap<Vec<usize>, i32>);

    impl Heuristic for TableHeuristic {
        fn compute_heuristic(&mut self, state: &State, _task: &Task) -> Estimate {
            match self.0.get(state.values()) {
                Some(&h) => Estimate::Finite(h),
                None => Estimate::DeadEnd,
            }
        }
    }

    fn swap_task_and_group(lookups: SymmetricalLookups) -> (Task, Rc<Group>) {
        let task = Task::new(
            vec![2, 2],
            vec![0, 0],
            vec![FactPair::new(0, 1), FactPair::new(1, 1)],
            vec![],
        )
        .unwrap();
        let opts = SymmetryOptions {
            symmetrical_lookups: lookups,
            rw_length_or_number_symmetric_states: -1,
            ..SymmetryOptions::default()
        };
        let mut group = Group::new(&task, opts);
        let mut engine = ReplayEngine::new(6, vec![vec![1, 0, 4, 5, 2, 3]]);
        group.compute_symmetries(&task, &mut engine).unwrap();
        (task, Rc::new(group))
    }

    #[test]
    fn rejects_disabled_lookups() {
        let (_, group) = swap_task_and_group(SymmetricalLookups::None);
        let delegate = Box::new(TableHeuristic(HashMap::new()));
        let result = SymmetricalLookupsHeuristic::new(delegate, group, Rc::new(LookupStats::default()));
        assert!(matches!(result, Err(ConfigError::LookupsDisabled)));
    }

    #[test]
    fn takes_the_maximum_over_the_orbit() {
        let (task, group) = swap_task_and_group(SymmetricalLookups::AllStates);
        let mut table = HashMap::new();
        table.insert(vec![1, 0], 2);
        table.insert(vec![0, 1], 6);
        let stats = Rc::new(LookupStats::default());
        let mut heuristic =
            SymmetricalLookupsHeuristic::new(Box::new(TableHeuristic(table)), group, stats.clone())
                .unwrap();

        let mut registry = StateRegistry::new(&task);
        let state = registry.register_state_buffer(vec![1, 0]);
        assert_eq!(heuristic.compute_heuristic(&state, &task), Estimate::Finite(6));
        assert_eq!(stats.generated_states(), 1);
        assert_eq!(stats.improving_states(), 1);
        assert_eq!(stats.improved_evaluations(), 1);

        // evaluating the stronger member gains nothing from its image
        let state = registry.register_state_buffer(vec![0, 1]);
        assert_eq!(heuristic.compute_heuristic(&state, &task), Estimate::Finite(6));
        assert_eq!(stats.generated_states(), 2);
        assert_eq!(stats.improving_states(), 1);
        assert_eq!(stats.improved_evaluations(), 1);
    }

    #[test]
    fn dead_end_on_an_image_propagates() {
        let (task, group) = swap_task_and_group(SymmetricalLookups::AllStates);
        // h(s) = 4, the symmetric image is absent and thus a dead end
        let mut table = HashMap::new();
        table.insert(vec![1, 0], 4);
        let stats = Rc::new(LookupStats::default());
        let mut heuristic =
            SymmetricalLookupsHeuristic::new(Box::new(TableHeuristic(table)), group, stats.clone())
                .unwrap();

        let mut registry = StateRegistry::new(&task);
        let state = registry.register_state_buffer(vec![1, 0]);
        assert_eq!(heuristic.compute_heuristic(&state, &task), Estimate::DeadEnd);
        assert_eq!(stats.improving_states(), 1);
        assert_eq!(stats.improved_evaluations(), 1);
        assert_eq!(stats.generated_states(), 1);
    }

    #[test]
    fn dead_end_of_the_state_itself_skips_lookups() {
        let (task, group) = swap_task_and_group(SymmetricalLookups::AllStates);
        let stats = Rc::new(LookupStats::default());
        let mut heuristic = SymmetricalLookupsHeuristic::new(
            Box::new(TableHeuristic(HashMap::new())),
            group,
            stats.clone(),
        )
        .unwrap();

        let mut registry = StateRegistry::new(&task);
        let state = registry.register_state_buffer(vec![1, 0]);
        assert_eq!(heuristic.compute_heuristic(&state, &task), Estimate::DeadEnd);
        assert_eq!(stats.generated_states(), 0);
        assert_eq!(stats.improved_evaluations(), 0);
    }

    #[test]
    fn estimates_order_with_dead_end_strongest() {
        assert!(Estimate::DeadEnd > Estimate::Finite(i32::MAX));
        assert!(Estimate::Finite(3) > Estimate::Finite(2));
    }
}
