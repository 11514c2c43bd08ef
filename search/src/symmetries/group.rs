use super::permutation::Permutation;
use super::raw::{self, RawPermutation};
use super::{
    AutomorphismEngine, FactIndexing, GraphRequest, SearchSymmetries, SymmetricalLookups,
    SymmetryOptions,
};
use fixedbitset::FixedBitSet;
use hashbrown::HashMap;
use itertools::Itertools;
use orbit_planning::{FactPair, State, StateRegistry, Task};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum GroupError {
    #[error("symmetries have already been computed for this group")]
    AlreadyInitialized,
    #[error("could not write generator dump: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of [Group::compute_symmetries].
#[derive(Debug, PartialEq, Eq)]
pub enum SymmetryOutcome {
    /// The group is ready for use by the search.
    Ready,
    /// The requested generator dump was written; the caller is expected to
    /// terminate successfully without searching.
    GeneratorsWritten,
}

/// The symmetry group of a task: an ordered list of generators over the
/// task's fact-index space plus the geometry tables needed to decode them.
///
/// Built exactly once via [Group::compute_symmetries]; read-only afterwards
/// and confined to a single owner thread (the random-walk state for lookups
/// is interior).
pub struct Group {
    opts: SymmetryOptions,
    indexing: Rc<FactIndexing>,
    graph_size: usize,
    generators: Vec<Permutation>,
    num_identity_generators: usize,
    to_be_written_generators: Vec<HashMap<usize, usize>>,
    initialized: bool,
    rng: RefCell<SmallRng>,
}

impl Group {
    pub fn new(task: &Task, opts: SymmetryOptions) -> Group {
        let rng = RefCell::new(SmallRng::seed_from_u64(opts.random_seed));
        Group {
            indexing: Rc::new(FactIndexing::new(task)),
            graph_size: 0,
            generators: Vec::new(),
            num_identity_generators: 0,
            to_be_written_generators: Vec::new(),
            initialized: false,
            rng,
            opts,
        }
    }

    pub fn indexing(&self) -> &Rc<FactIndexing> {
        &self.indexing
    }

    pub fn search_symmetries(&self) -> SearchSymmetries {
        self.opts.search_symmetries
    }

    pub fn symmetrical_lookups(&self) -> SymmetricalLookups {
        self.opts.symmetrical_lookups
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn has_symmetries(&self) -> bool {
        !self.generators.is_empty()
    }

    pub fn num_generators(&self) -> usize {
        self.generators.len()
    }

    /// Generators that were identity on facts and therefore not stored.
    pub fn num_identity_generators(&self) -> usize {
        self.num_identity_generators
    }

    pub fn generators(&self) -> impl Iterator<Item = &Permutation> {
        self.generators.iter()
    }

    pub fn generator(&self, index: usize) -> &Permutation {
        &self.generators[index]
    }

    /// Runs the automorphism engine and imports its generators.
    ///
    /// The group becomes initialized regardless of the outcome, so that no
    /// second attempt is made when the engine found nothing. Engine failure
    /// is soft: the group is left without symmetries and the search proceeds
    /// unpruned.
    pub fn compute_symmetries(
        &mut self,
        task: &Task,
        engine: &mut dyn AutomorphismEngine,
    ) -> Result<SymmetryOutcome, GroupError> {
        if self.initialized || !self.generators.is_empty() {
            return Err(GroupError::AlreadyInitialized);
        }
        self.graph_size = engine.graph_size(task);
        let request = GraphRequest {
            stabilize_initial_state: self.opts.stabilize_initial_state,
            stabilize_goal: self.opts.stabilize_goal,
            use_color_for_stabilizing_goal: self.opts.use_color_for_stabilizing_goal,
            time_bound: self.opts.time_bound,
            dump_symmetry_graph: self.opts.dump_symmetry_graph,
        };
        let result = engine.find_automorphisms(task, &request, &mut |generator| {
            self.add_raw_generator(generator)
        });
        if let Err(failure) = result {
            warn!("symmetry engine gave up ({failure}); searching without symmetries");
            self.generators.clear();
        }
        self.initialized = true;

        if self.opts.write_search_generators || self.opts.write_all_generators {
            self.write_generators_to(Path::new("generators.py"))?;
            return Ok(SymmetryOutcome::GeneratorsWritten);
        }
        Ok(SymmetryOutcome::Ready)
    }

    /// Imports one raw generator of the engine. Generators that are identity
    /// on facts (they may still move operator vertices) are counted but not
    /// stored.
    pub fn add_raw_generator(&mut self, generator: &[usize]) {
        let permutation = Permutation::from_raw(self.indexing.clone(), generator);
        if permutation.identity() {
            self.num_identity_generators += 1;
            if self.opts.write_all_generators {
                self.record_generator_for_writing(generator);
            }
        } else {
            if self.opts.write_search_generators || self.opts.write_all_generators {
                self.record_generator_for_writing(generator);
            }
            self.generators.push(permutation);
        }
    }

    fn record_generator_for_writing(&mut self, generator: &[usize]) {
        let length = if self.opts.write_search_generators {
            self.indexing.length()
        } else {
            self.graph_size
        };
        let moved: HashMap<usize, usize> = generator[..length]
            .iter()
            .enumerate()
            .filter(|&(from, &to)| from != to)
            .map(|(from, &to)| (from, to))
            .collect();
        self.to_be_written_generators.push(moved);
    }

    /// Writes the recorded generators as python-style index lists, renumbering
    /// the actually-moved vertices consecutively to keep the dump small.
    pub fn write_generators_to(&self, path: &Path) -> std::io::Result<()> {
        let mut vertex_to_id: HashMap<usize, usize> = HashMap::new();
        for generator in &self.to_be_written_generators {
            for &from in generator.keys().sorted() {
                let next = vertex_to_id.len();
                vertex_to_id.entry(from).or_insert(next);
            }
        }
        let mut file = File::create(path)?;
        for generator in &self.to_be_written_generators {
            let mut permutation: Vec<usize> = (0..vertex_to_id.len()).collect();
            for (&from, &to) in generator {
                permutation[vertex_to_id[&from]] = vertex_to_id[&to];
            }
            writeln!(file, "[{}]", permutation.iter().format(", "))?;
        }
        Ok(())
    }

    /// Greedy orbit minimisation: scan the generators in order, replacing the
    /// vector by any lexicographically smaller image, until a full pass
    /// leaves it unchanged.
    ///
    /// Not guaranteed to reach the true orbit minimum, but deterministic for
    /// a fixed generator order, which is what duplicate detection relies on.
    pub fn canonical_representative(&self, state: &State) -> Vec<usize> {
        let mut values = state.values().to_vec();
        let mut changed = true;
        while changed {
            changed = false;
            for generator in &self.generators {
                if generator.replace_if_less(&mut values) {
                    changed = true;
                }
            }
        }
        values
    }

    /// Like [Self::canonical_representative], but returns the indices of the
    /// generators applied, in application order.
    pub fn trace_to_canonical(&self, state: &State) -> Vec<usize> {
        let mut values = state.values().to_vec();
        let mut trace = Vec::new();
        let mut changed = true;
        while changed {
            changed = false;
            for (index, generator) in self.generators.iter().enumerate() {
                if generator.replace_if_less(&mut values) {
                    trace.push(index);
                    changed = true;
                }
            }
        }
        trace
    }

    /// Folds a permutation trace into a single raw permutation that maps the
    /// traced state to its canonical representative.
    pub fn permutation_from_trace(&self, trace: &[usize]) -> RawPermutation {
        let mut permutation = raw::identity(self.indexing.length());
        for &index in trace {
            let generator = &self.generators[index];
            for entry in permutation.iter_mut() {
                *entry = generator.value(*entry);
            }
        }
        permutation
    }

    pub fn identity_raw_permutation(&self) -> RawPermutation {
        raw::identity(self.indexing.length())
    }

    /// The group element carrying `from_state` to `to_state`, obtained by
    /// composing the trace of `from_state` with the inverted trace of
    /// `to_state` through the shared canonical representative.
    ///
    /// Both states must lie in the same orbit; otherwise the result maps
    /// neither state to the other.
    pub fn create_permutation_from_state_to_state(
        &self,
        from_state: &State,
        to_state: &State,
    ) -> RawPermutation {
        debug_assert_eq!(
            self.canonical_representative(from_state),
            self.canonical_representative(to_state),
            "states lie in different orbits"
        );
        let from_trace = self.trace_to_canonical(from_state);
        let to_trace = self.trace_to_canonical(to_state);
        let to_canonical = self.permutation_from_trace(&from_trace);
        let from_canonical = raw::inverse(&self.permutation_from_trace(&to_trace));
        raw::compose(&to_canonical, &from_canonical)
    }

    /// Enumerates symmetric images of `state` according to the configured
    /// lookup strategy, registering them in the caller-provided auxiliary
    /// registry so the main search space stays unpolluted.
    pub fn compute_symmetric_states(
        &self,
        state: &State,
        registry: &mut StateRegistry,
        states: &mut Vec<State>,
    ) {
        if self.generators.is_empty() {
            return;
        }
        match self.opts.symmetrical_lookups {
            SymmetricalLookups::None => {}
            SymmetricalLookups::OneState => {
                self.compute_random_symmetric_state(state, registry, states)
            }
            SymmetricalLookups::SubsetOfStates | SymmetricalLookups::AllStates => {
                self.compute_subset_all_symmetric_states(state, registry, states)
            }
        }
    }

    /// Random walk in the Cayley graph: apply a uniformly random generator at
    /// each step, emit the final state iff it differs from the input.
    fn compute_random_symmetric_state(
        &self,
        state: &State,
        registry: &mut StateRegistry,
        states: &mut Vec<State>,
    ) {
        let mut rng = self.rng.borrow_mut();
        let mut current = registry.register_state_buffer(state.values().to_vec());
        for _ in 0..self.opts.rw_length_or_number_symmetric_states.max(0) {
            let generator = &self.generators[rng.random_range(0..self.generators.len())];
            current = registry.permute_state(&current, |values| generator.apply_to_values(values));
        }
        if current.values() != state.values() {
            states.push(current);
        }
    }

    /// Breadth-first closure of the orbit, deduplicated via a reached flag
    /// per registered state. Emits at most
    /// `rw_length_or_number_symmetric_states` new states in subset mode;
    /// exhausts the orbit otherwise.
    fn compute_subset_all_symmetric_states(
        &self,
        state: &State,
        registry: &mut StateRegistry,
        states: &mut Vec<State>,
    ) {
        let bound = match self.opts.symmetrical_lookups {
            SymmetricalLookups::SubsetOfStates => {
                Some(self.opts.rw_length_or_number_symmetric_states.max(0) as usize)
            }
            _ => None,
        };
        if bound == Some(0) {
            return;
        }

        let origin = registry.register_state_buffer(state.values().to_vec());
        let mut reached = FixedBitSet::with_capacity(origin.id().index() + 1);
        reached.insert(origin.id().index());
        let mut emitted = 0;
        let mut queue = VecDeque::new();
        queue.push_back(origin);
        while let Some(current) = queue.pop_front() {
            for generator in &self.generators {
                let image =
                    registry.permute_state(&current, |values| generator.apply_to_values(values));
                let index = image.id().index();
                if index >= reached.len() {
                    reached.grow(index + 1);
                }
                if !reached.contains(index) {
                    reached.insert(index);
                    states.push(image.clone());
                    emitted += 1;
                    if bound == Some(emitted) {
                        return;
                    }
                    queue.push_back(image);
                }
            }
        }
    }

    pub fn statistics(&self, task: &Task) {
        info!("Size of the grounded symmetry graph: {}", self.graph_size);
        info!(
            "Number of search generators (affecting facts): {}",
            self.num_generators()
        );
        info!(
            "Number of identity generators (on facts, not on operators): {}",
            self.num_identity_generators
        );
        info!(
            "Total number of generators: {}",
            self.num_generators() + self.num_identity_generators
        );
        if self.opts.dump_permutations {
            self.dump_generators();
            self.dump_variables_equivalence_classes(task);
        }
    }

    pub fn dump_generators(&self) {
        if self.generators.is_empty() {
            return;
        }
        for (index, generator) in self.generators.iter().enumerate() {
            info!(
                "Generator {index} moves variables {:?}: {generator}",
                generator.var_cycles()
            );
        }
        info!("Extra group info:");
        info!(
            "Number of identity on states generators: {}",
            self.num_identity_generators
        );
        info!("Permutation length: {}", self.indexing.length());
    }

    /// Logs the classes of the coarsest variable partition in which every
    /// generator moves variables only within their class. Class members are
    /// named after their first fact.
    pub fn dump_variables_equivalence_classes(&self, task: &Task) {
        if self.generators.is_empty() {
            return;
        }
        let num_vars = self.indexing.num_variables();
        let mut vars_mapping: Vec<usize> = (0..num_vars).collect();
        let mut change = true;
        while change {
            change = false;
            for generator in &self.generators {
                let affected = generator.affected_vars();
                let min = affected
                    .iter()
                    .map(|&var| vars_mapping[var])
                    .min()
                    .expect("non-identity generator affects no variable");
                for &var in affected {
                    if vars_mapping[var] > min {
                        change = true;
                        vars_mapping[var] = min;
                    }
                }
            }
        }
        info!("Equivalence relation:");
        for representative in 0..num_vars {
            let class: Vec<usize> = (0..num_vars)
                .filter(|&var| vars_mapping[var] == representative)
                .collect();
            if class.len() <= 1 {
                continue;
            }
            info!(
                "[{}]",
                class
                    .iter()
                    .map(|&var| task.fact_name(FactPair::new(var, 0)))
                    .format(" ")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetries::{EngineFailure, ReplayEngine};

    /// Two interchangeable variables with three values each.
    fn symmetric_task() -> Task {
        Task::new(vec![3, 3], vec![0, 0], vec![FactPair::new(0, 2), FactPair::new(1, 2)], vec![]).unwrap()
    }

    /// Raw generator swapping the two variables of [symmetric_task]; the two
    /// trailing vertices stand for operators and map onto each other.
    fn swap_generator() -> Vec<usize> {
        vec![1, 0, 5, 6, 7, 2, 3, 4, 9, 8]
    }

    fn swap_group(opts: SymmetryOptions) -> (Task, Group) {
        let task = symmetric_task();
        let mut group = Group::new(&task, opts);
        let mut engine = ReplayEngine::new(10, vec![swap_generator()]);
        let outcome = group.compute_symmetries(&task, &mut engine).unwrap();
        assert_eq!(outcome, SymmetryOutcome::Ready);
        (task, group)
    }

    #[test]
    fn canonicalization_of_a_variable_swap() {
        let (task, group) = swap_group(SymmetryOptions::default());
        assert!(group.has_symmetries());
        let mut registry = StateRegistry::new(&task);
        let high_low = registry.register_state_buffer(vec![1, 0]);
        let low_high = registry.register_state_buffer(vec![0, 1]);

        assert_eq!(group.canonical_representative(&high_low), vec![0, 1]);
        assert_eq!(group.canonical_representative(&low_high), vec![0, 1]);
        assert_eq!(group.trace_to_canonical(&high_low).len(), 1);
        assert_eq!(group.trace_to_canonical(&low_high).len(), 0);
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let (task, group) = swap_group(SymmetryOptions::default());
        let mut registry = StateRegistry::new(&task);
        for values in [vec![2, 1], vec![1, 2], vec![0, 2], vec![2, 2]] {
            let state = registry.register_state_buffer(values);
            let canonical = group.canonical_representative(&state);
            let canonical_state = registry.register_state_buffer(canonical.clone());
            assert_eq!(group.canonical_representative(&canonical_state), canonical);
        }
    }

    #[test]
    fn trace_maps_state_to_canonical() {
        let (task, group) = swap_group(SymmetryOptions::default());
        let mut registry = StateRegistry::new(&task);
        let state = registry.register_state_buffer(vec![2, 0]);
        let trace = group.trace_to_canonical(&state);
        let permutation = group.permutation_from_trace(&trace);
        let lifted = Permutation::from_raw(group.indexing().clone(), &permutation);
        assert_eq!(lifted.apply_to_values(state.values()), group.canonical_representative(&state));
    }

    #[test]
    fn state_to_state_permutation() {
        let (task, group) = swap_group(SymmetryOptions::default());
        let mut registry = StateRegistry::new(&task);
        let from = registry.register_state_buffer(vec![2, 1]);
        let to = registry.register_state_buffer(vec![1, 2]);
        let permutation = group.create_permutation_from_state_to_state(&from, &to);
        let lifted = Permutation::from_raw(group.indexing().clone(), &permutation);
        assert_eq!(lifted.apply_to_values(from.values()), to.values());
    }

    #[test]
    fn orbit_closure_under_all_states() {
        let opts = SymmetryOptions {
            symmetrical_lookups: SymmetricalLookups::AllStates,
            rw_length_or_number_symmetric_states: -1,
            ..SymmetryOptions::default()
        };
        let (task, group) = swap_group(opts);
        let mut registry = StateRegistry::new(&task);
        let state = registry.register_state_buffer(vec![2, 0]);

        let mut lookup_registry = StateRegistry::new(&task);
        let mut orbit = Vec::new();
        group.compute_symmetric_states(&state, &mut lookup_registry, &mut orbit);
        assert_eq!(orbit.len(), 1);
        assert_eq!(orbit[0].values(), &[0, 2]);

        // the emitted set plus the input is closed under every generator
        let mut closure: Vec<Vec<usize>> = orbit.iter().map(|s| s.values().to_vec()).collect();
        closure.push(state.values().to_vec());
        for member in &closure {
            for generator in group.generators() {
                assert!(closure.contains(&generator.apply_to_values(member)));
            }
        }
    }

    #[test]
    fn random_walk_lookup() {
        // a walk of odd length along the single swap generator leaves the orbit's
        // other member; an even walk composes to the identity and emits nothing
        for (length, expected) in [(3, 1), (2, 0)] {
            let opts = SymmetryOptions {
                symmetrical_lookups: SymmetricalLookups::OneState,
                rw_length_or_number_symmetric_states: length,
                ..SymmetryOptions::default()
            };
            let (task, group) = swap_group(opts);
            let mut registry = StateRegistry::new(&task);
            let state = registry.register_state_buffer(vec![1, 0]);
            let mut lookup_registry = StateRegistry::new(&task);
            let mut states = Vec::new();
            group.compute_symmetric_states(&state, &mut lookup_registry, &mut states);
            assert_eq!(states.len(), expected);
            if expected == 1 {
                assert_eq!(states[0].values(), &[0, 1]);
            }
        }
    }

    #[test]
    fn subset_mode_respects_bound() {
        let opts = SymmetryOptions {
            symmetrical_lookups: SymmetricalLookups::SubsetOfStates,
            rw_length_or_number_symmetric_states: 1,
            ..SymmetryOptions::default()
        };
        let (task, group) = swap_group(opts);
        let mut registry = StateRegistry::new(&task);
        let state = registry.register_state_buffer(vec![2, 0]);
        let mut lookup_registry = StateRegistry::new(&task);
        let mut states = Vec::new();
        group.compute_symmetric_states(&state, &mut lookup_registry, &mut states);
        assert_eq!(states.len(), 1);
    }

    #[test]
    fn second_initialization_is_rejected() {
        let (task, mut group) = swap_group(SymmetryOptions::default());
        let mut engine = ReplayEngine::new(10, vec![]);
        assert!(matches!(
            group.compute_symmetries(&task, &mut engine),
            Err(GroupError::AlreadyInitialized)
        ));
    }

    #[test]
    fn engine_failure_is_soft() {
        struct FailingEngine;
        impl AutomorphismEngine for FailingEngine {
            fn graph_size(&self, _task: &Task) -> usize {
                10
            }
            fn find_automorphisms(
                &mut self,
                _task: &Task,
                request: &GraphRequest,
                emit: &mut dyn FnMut(&[usize]),
            ) -> Result<(), EngineFailure> {
                emit(&swap_generator());
                Err(EngineFailure::Timeout(request.time_bound))
            }
        }

        let task = symmetric_task();
        let mut group = Group::new(&task, SymmetryOptions::default());
        let outcome = group.compute_symmetries(&task, &mut FailingEngine).unwrap();
        assert_eq!(outcome, SymmetryOutcome::Ready);
        assert!(group.is_initialized());
        assert!(!group.has_symmetries());
    }

    #[test]
    fn identity_on_facts_generators_are_counted_not_stored() {
        let task = symmetric_task();
        let mut group = Group::new(&task, SymmetryOptions::default());
        // facts fixed, only the two operator vertices swapped
        let mut engine = ReplayEngine::new(10, vec![vec![0, 1, 2, 3, 4, 5, 6, 7, 9, 8]]);
        group.compute_symmetries(&task, &mut engine).unwrap();
        assert!(!group.has_symmetries());
        assert_eq!(group.num_identity_generators(), 1);
    }

    #[test]
    fn generator_dump_renumbers_moved_vertices() {
        let task = symmetric_task();
        let opts = SymmetryOptions {
            write_search_generators: true,
            ..SymmetryOptions::default()
        };
        let mut group = Group::new(&task, opts);
        group.graph_size = 10;
        group.add_raw_generator(&swap_generator());

        let path = std::env::temp_dir().join("orbit_generator_dump_test.py");
        group.write_generators_to(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        // all 8 search vertices move, renumbered 0..8
        assert_eq!(contents.trim(), "[1, 0, 5, 6, 7, 2, 3, 4]");
    }
}
