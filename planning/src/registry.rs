use crate::packer::StatePacker;
use crate::state::{State, StateId};
use crate::task::{OperatorId, Task};
use hashbrown::HashMap;

/// Interning storage for the states encountered during search.
///
/// States are deduplicated on their packed form; ids are dense and stable for
/// the lifetime of the registry. The registry is single-owner: auxiliary
/// registries (for symmetric lookups or plan reconstruction) are created
/// separately and never share ids with the main one.
pub struct StateRegistry<'a> {
    task: &'a Task,
    packer: StatePacker,
    states: Vec<Box<[u32]>>,
    ids: HashMap<Box<[u32]>, StateId>,
}

impl<'a> StateRegistry<'a> {
    pub fn new(task: &'a Task) -> StateRegistry<'a> {
        StateRegistry {
            task,
            packer: StatePacker::new(task.domain_sizes()),
            states: Vec::new(),
            ids: HashMap::new(),
        }
    }

    pub fn task(&self) -> &'a Task {
        self.task
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn state_ids(&self) -> impl Iterator<Item = StateId> {
        (0..self.states.len()).map(StateId::from)
    }

    pub fn get_initial_state(&mut self) -> State {
        self.register_state_buffer(self.task.initial_values().to_vec())
    }

    /// Interns the given value vector and returns the corresponding state.
    pub fn register_state_buffer(&mut self, values: Vec<usize>) -> State {
        debug_assert_eq!(values.len(), self.task.num_variables());
        debug_assert!(values.iter().enumerate().all(|(v, &val)| val < self.task.domain_size(v)));
        let packed = self.packer.pack(&values);
        let id = match self.ids.get(&packed) {
            Some(&id) => id,
            None => {
                let id = StateId::from(self.states.len());
                self.states.push(packed.clone());
                self.ids.insert(packed, id);
                id
            }
        };
        State::new(id, values)
    }

    pub fn lookup_state(&self, id: StateId) -> State {
        State::new(id, self.packer.unpack(&self.states[id.index()]))
    }

    /// Applies a permutation of the task's facts to `state` and registers the
    /// image. The permutation itself lives with the symmetry layer and is
    /// supplied as a callback on the unpacked value vector.
    pub fn permute_state(
        &mut self,
        state: &State,
        permute: impl FnOnce(&[usize]) -> Vec<usize>,
    ) -> State {
        self.register_state_buffer(permute(state.values()))
    }

    /// Applies `op` to `state` and registers the resulting successor.
    pub fn get_successor_state(&mut self, state: &State, op: OperatorId) -> State {
        debug_assert!(self.task.is_applicable(op, state.values()));
        let mut values = state.values().to_vec();
        for eff in &self.task.operator(op).eff {
            values[eff.var] = eff.value;
        }
        self.register_state_buffer(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{FactPair, Operator};

    fn task() -> Task {
        Task::new(
            vec![2, 2],
            vec![0, 0],
            vec![FactPair::new(0, 1), FactPair::new(1, 1)],
            vec![
                Operator {
                    name: "set-first".to_string(),
                    pre: vec![FactPair::new(0, 0)],
                    eff: vec![FactPair::new(0, 1)],
                    cost: 1,
                },
                Operator {
                    name: "set-second".to_string(),
                    pre: vec![],
                    eff: vec![FactPair::new(1, 1)],
                    cost: 1,
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn interns_states() {
        let task = task();
        let mut registry = StateRegistry::new(&task);
        let init = registry.get_initial_state();
        let again = registry.register_state_buffer(vec![0, 0]);
        assert_eq!(init.id(), again.id());
        assert_eq!(registry.num_states(), 1);

        let other = registry.register_state_buffer(vec![1, 0]);
        assert_ne!(init.id(), other.id());
        assert_eq!(registry.lookup_state(other.id()).values(), &[1, 0]);
    }

    #[test]
    fn permuted_states_are_interned_like_any_other() {
        let task = task();
        let mut registry = StateRegistry::new(&task);
        let state = registry.register_state_buffer(vec![1, 0]);
        let swapped = registry.permute_state(&state, |values| {
            values.iter().rev().copied().collect()
        });
        assert_eq!(swapped.values(), &[0, 1]);
        let direct = registry.register_state_buffer(vec![0, 1]);
        assert_eq!(swapped.id(), direct.id());
    }

    #[test]
    fn successor_application() {
        let task = task();
        let mut registry = StateRegistry::new(&task);
        let init = registry.get_initial_state();
        let succ = registry.get_successor_state(&init, OperatorId::from(0));
        assert_eq!(succ.values(), &[1, 0]);
        let goal = registry.get_successor_state(&succ, OperatorId::from(1));
        assert!(task.is_goal(goal.values()));
    }
}
