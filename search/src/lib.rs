//! Search-space bookkeeping and structural-symmetry pruning for grounded
//! planning tasks.
//!
//! The [symmetries] module holds the permutation group of the task and the
//! canonicalization machinery built on it; [search_space] records per-state
//! search information and reconstructs plans, also when the search stored
//! canonical images of its states; [heuristics] wraps a heuristic so that it
//! also consults symmetric images of the evaluated state.

pub mod heuristics;
pub mod search_space;
pub mod statistics;
pub mod symmetries;
