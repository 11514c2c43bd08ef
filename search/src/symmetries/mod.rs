//! Structural symmetries of a grounded task.
//!
//! The raw automorphisms of the task's symmetry graph are computed by an
//! external engine behind the [AutomorphismEngine] trait; this module only
//! consumes the resulting generators as integer arrays and lifts them to
//! permutations of the task's facts.

pub mod group;
pub mod permutation;
pub mod raw;

pub use group::{Group, GroupError, SymmetryOutcome};
pub use permutation::Permutation;
pub use raw::RawPermutation;

use orbit_planning::Task;
use std::str::FromStr;
use thiserror::Error;

/// How the search uses the symmetry group. Governs which path-tracing
/// algorithm applies when a plan is extracted.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SearchSymmetries {
    /// The group is not used for pruning.
    None,
    /// Orbit space search: only canonical representatives are stored.
    Oss,
    /// Each encountered state is stored, duplicates are pruned via canonical
    /// images.
    Dks,
}

impl FromStr for SearchSymmetries {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(SearchSymmetries::None),
            "oss" => Ok(SearchSymmetries::Oss),
            "dks" => Ok(SearchSymmetries::Dks),
            x => Err(format!("Unknown search symmetries type: {x}")),
        }
    }
}

/// Strategy for enumerating symmetric images of a state during heuristic
/// lookups.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SymmetricalLookups {
    None,
    /// A single state obtained by a random walk in the Cayley graph.
    OneState,
    /// A bounded prefix of the breadth-first orbit closure.
    SubsetOfStates,
    /// The full orbit.
    AllStates,
}

impl FromStr for SymmetricalLookups {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(SymmetricalLookups::None),
            "one_state" => Ok(SymmetricalLookups::OneState),
            "subset_of_states" => Ok(SymmetricalLookups::SubsetOfStates),
            "all_states" => Ok(SymmetricalLookups::AllStates),
            x => Err(format!("Unknown symmetrical lookups type: {x}")),
        }
    }
}

/// Configuration record for building and using a [Group].
#[derive(Clone, Debug)]
pub struct SymmetryOptions {
    /// Include the initial-state coloring constraint in the symmetry graph.
    pub stabilize_initial_state: bool,
    /// Include the goal coloring in the symmetry graph.
    pub stabilize_goal: bool,
    /// Use a vertex color rather than an auxiliary node to stabilize the goal.
    pub use_color_for_stabilizing_goal: bool,
    /// Time bound for the engine, in seconds; 0 means unbounded.
    pub time_bound: u64,
    /// Ask the engine to write the symmetry graph in dot form.
    pub dump_symmetry_graph: bool,
    pub search_symmetries: SearchSymmetries,
    pub symmetrical_lookups: SymmetricalLookups,
    /// Length of the random walk (one_state) or number of states to emit
    /// (subset_of_states); -1 enumerates the whole orbit.
    pub rw_length_or_number_symmetric_states: i32,
    pub random_seed: u64,
    /// Log the cycle structure of every generator after construction.
    pub dump_permutations: bool,
    /// Write the non-identity generators to `generators.py` and stop.
    pub write_search_generators: bool,
    /// Write all generators, identity on facts included, to `generators.py`
    /// and stop.
    pub write_all_generators: bool,
}

impl Default for SymmetryOptions {
    fn default() -> SymmetryOptions {
        SymmetryOptions {
            stabilize_initial_state: false,
            stabilize_goal: true,
            use_color_for_stabilizing_goal: true,
            time_bound: 0,
            dump_symmetry_graph: false,
            search_symmetries: SearchSymmetries::None,
            symmetrical_lookups: SymmetricalLookups::None,
            rw_length_or_number_symmetric_states: 5,
            random_seed: 2011,
            dump_permutations: false,
            write_search_generators: false,
            write_all_generators: false,
        }
    }
}

/// Layout of the flat vertex-index space shared with the automorphism engine.
///
/// Positions `0..num_vars` stand for the task variables, positions
/// `num_vars..length` for their facts, variable by variable. Operator
/// vertices, if the engine uses any, come after `length` and are ignored by
/// the search generators.
pub struct FactIndexing {
    num_vars: usize,
    permutation_length: usize,
    dom_sum_by_var: Vec<usize>,
    var_by_val: Vec<usize>,
}

impl FactIndexing {
    pub fn new(task: &Task) -> FactIndexing {
        let num_vars = task.num_variables();
        let mut dom_sum_by_var = Vec::with_capacity(num_vars);
        let mut var_by_val = Vec::with_capacity(task.num_facts());
        let mut offset = num_vars;
        for var in 0..num_vars {
            dom_sum_by_var.push(offset);
            offset += task.domain_size(var);
            var_by_val.extend(std::iter::repeat(var).take(task.domain_size(var)));
        }
        FactIndexing {
            num_vars,
            permutation_length: offset,
            dom_sum_by_var,
            var_by_val,
        }
    }

    pub fn num_variables(&self) -> usize {
        self.num_vars
    }

    /// Length of a search generator: variable plus fact positions.
    pub fn length(&self) -> usize {
        self.permutation_length
    }

    pub fn index(&self, var: usize, val: usize) -> usize {
        self.dom_sum_by_var[var] + val
    }

    pub fn domain_size(&self, var: usize) -> usize {
        let end = if var + 1 < self.num_vars {
            self.dom_sum_by_var[var + 1]
        } else {
            self.permutation_length
        };
        end - self.dom_sum_by_var[var]
    }

    pub fn var_of_index(&self, index: usize) -> usize {
        debug_assert!(index >= self.num_vars);
        self.var_by_val[index - self.num_vars]
    }

    pub fn var_val_of_index(&self, index: usize) -> (usize, usize) {
        let var = self.var_of_index(index);
        (var, index - self.dom_sum_by_var[var])
    }
}

/// The graph-construction options handed to the automorphism engine.
pub struct GraphRequest {
    pub stabilize_initial_state: bool,
    pub stabilize_goal: bool,
    pub use_color_for_stabilizing_goal: bool,
    /// Seconds; 0 means unbounded.
    pub time_bound: u64,
    pub dump_symmetry_graph: bool,
}

#[derive(Error, Debug)]
pub enum EngineFailure {
    #[error("automorphism engine timed out after {0}s")]
    Timeout(u64),
    #[error("automorphism engine failed: {0}")]
    Failed(String),
}

/// Boundary to the external graph-automorphism engine.
///
/// The engine owns the construction of the symmetry graph; the group only
/// sees the vertex count and the raw generators, delivered through `emit` in
/// a fixed order that canonicalization results depend on.
pub trait AutomorphismEngine {
    /// Number of vertices of the symmetry graph built for `task`, including
    /// operator vertices.
    fn graph_size(&self, task: &Task) -> usize;

    /// Runs the engine, calling `emit` once per raw generator. Each emitted
    /// slice has `graph_size` entries and is a bijection on `0..graph_size`.
    fn find_automorphisms(
        &mut self,
        task: &Task,
        request: &GraphRequest,
        emit: &mut dyn FnMut(&[usize]),
    ) -> Result<(), EngineFailure>;
}

/// Replays generators that were computed elsewhere, e.g. read back from a
/// generator dump.
pub struct ReplayEngine {
    graph_size: usize,
    generators: Vec<Vec<usize>>,
}

impl ReplayEngine {
    pub fn new(graph_size: usize, generators: Vec<Vec<usize>>) -> ReplayEngine {
        assert!(generators.iter().all(|g| g.len() == graph_size));
        ReplayEngine {
            graph_size,
            generators,
        }
    }
}

impl AutomorphismEngine for ReplayEngine {
    fn graph_size(&self, _task: &Task) -> usize {
        self.graph_size
    }

    fn find_automorphisms(
        &mut self,
        _task: &Task,
        _request: &GraphRequest,
        emit: &mut dyn FnMut(&[usize]),
    ) -> Result<(), EngineFailure> {
        for generator in &self.generators {
            emit(generator);
        }
        Ok(())
    }
}
