use super::FactIndexing;
use itertools::Itertools;
use orbit_planning::FactPair;
use smallvec::{smallvec, SmallVec};
use std::fmt::{Display, Error, Formatter};
use std::rc::Rc;

/// A group element lifted to the task: a permutation of fact indices together
/// with the set of variables it can move.
///
/// Immutable after construction. The decoding tables are injected as a shared
/// [FactIndexing] so that permutations carry no reference back to the group
/// that owns them.
pub struct Permutation {
    indexing: Rc<FactIndexing>,
    value: Vec<usize>,
    inverse_value: Vec<usize>,
    /// Affected variables, sorted ascending.
    affected: SmallVec<[usize; 8]>,
}

impl Permutation {
    /// Lifts a raw generator of the automorphism engine. Positions past the
    /// fact space (operator vertices) are dropped.
    pub fn from_raw(indexing: Rc<FactIndexing>, raw: &[usize]) -> Permutation {
        let length = indexing.length();
        assert!(raw.len() >= length);
        let value: Vec<usize> = raw[..length].to_vec();
        let mut inverse_value = vec![0; length];
        for (i, &j) in value.iter().enumerate() {
            debug_assert!(j < length, "generator maps a fact onto an operator vertex");
            inverse_value[j] = i;
        }
        let mut affected: SmallVec<[usize; 8]> = SmallVec::new();
        for i in indexing.num_variables()..length {
            if value[i] != i {
                for var in [indexing.var_of_index(i), indexing.var_of_index(value[i])] {
                    if let Err(pos) = affected.binary_search(&var) {
                        affected.insert(pos, var);
                    }
                }
            }
        }
        // structural generators map all facts of a variable to facts of a
        // single destination variable
        debug_assert!(affected.iter().all(|&var| {
            let dest = indexing.var_of_index(value[indexing.index(var, 0)]);
            (0..indexing.domain_size(var))
                .all(|val| indexing.var_of_index(value[indexing.index(var, val)]) == dest)
        }));
        Permutation {
            indexing,
            value,
            inverse_value,
            affected,
        }
    }

    /// True iff the permutation leaves every fact in place; it may still move
    /// operator vertices of the symmetry graph.
    pub fn identity(&self) -> bool {
        self.affected.is_empty()
    }

    /// Variables whose value can change under application, in ascending order.
    pub fn affected_vars(&self) -> &[usize] {
        &self.affected
    }

    pub fn value(&self, index: usize) -> usize {
        self.value[index]
    }

    pub fn inverse_value(&self, index: usize) -> usize {
        self.inverse_value[index]
    }

    /// Image of the fact `var=val` as a (variable, value) pair.
    pub fn image_of(&self, var: usize, val: usize) -> (usize, usize) {
        self.indexing.var_val_of_index(self.value[self.indexing.index(var, val)])
    }

    /// Applies the permutation to an unpacked value vector.
    pub fn apply_to_values(&self, values: &[usize]) -> Vec<usize> {
        let mut out = values.to_vec();
        for &var in &self.affected {
            let (to_var, to_val) = self.image_of(var, values[var]);
            out[to_var] = to_val;
        }
        out
    }

    /// Canonicalization primitive: if the image of `values` is
    /// lexicographically smaller across the variable order, overwrite
    /// `values` in place and return true; otherwise leave it untouched.
    ///
    /// Only affected variables can differ, so the comparison walks them in
    /// ascending order and stops at the first differing variable.
    pub fn replace_if_less(&self, values: &mut [usize]) -> bool {
        if self.identity() {
            return false;
        }
        let mut image: SmallVec<[usize; 8]> = smallvec![0; self.affected.len()];
        for &var in &self.affected {
            let (to_var, to_val) = self.image_of(var, values[var]);
            let slot = self
                .affected
                .binary_search(&to_var)
                .expect("image variable of an affected variable is affected");
            image[slot] = to_val;
        }
        for (slot, &var) in self.affected.iter().enumerate() {
            if image[slot] < values[var] {
                for (s, &v) in self.affected.iter().enumerate() {
                    values[v] = image[s];
                }
                return true;
            }
            if image[slot] > values[var] {
                return false;
            }
        }
        false
    }

    /// Cycles of the induced variable permutation, restricted to affected
    /// variables.
    pub fn var_cycles(&self) -> Vec<Vec<usize>> {
        let mut cycles = Vec::new();
        let mut seen: SmallVec<[usize; 8]> = SmallVec::new();
        for &start in &self.affected {
            if seen.contains(&start) {
                continue;
            }
            let mut cycle = vec![start];
            seen.push(start);
            let mut var = self.indexing.var_of_index(self.value[self.indexing.index(start, 0)]);
            while var != start {
                cycle.push(var);
                seen.push(var);
                var = self.indexing.var_of_index(self.value[self.indexing.index(var, 0)]);
            }
            cycles.push(cycle);
        }
        cycles
    }

    /// Cycles of the fact permutation, for diagnostics.
    pub fn fact_cycles(&self) -> Vec<Vec<FactPair>> {
        let num_vars = self.indexing.num_variables();
        let mut visited = vec![false; self.value.len()];
        let mut cycles = Vec::new();
        for start in num_vars..self.value.len() {
            if visited[start] || self.value[start] == start {
                continue;
            }
            let mut cycle = Vec::new();
            let mut index = start;
            while !visited[index] {
                visited[index] = true;
                let (var, val) = self.indexing.var_val_of_index(index);
                cycle.push(FactPair::new(var, val));
                index = self.value[index];
            }
            cycles.push(cycle);
        }
        cycles
    }
}

impl Display for Permutation {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        for cycle in self.fact_cycles() {
            write!(f, "({}) ", cycle.iter().format(" "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_planning::Task;

    fn two_var_swap() -> (Rc<FactIndexing>, Permutation) {
        let task = Task::new(vec![2, 2], vec![0, 0], vec![], vec![]).unwrap();
        let indexing = Rc::new(FactIndexing::new(&task));
        // vertices: vars 0,1; facts v0 at 2,3; facts v1 at 4,5
        let swap = Permutation::from_raw(indexing.clone(), &[1, 0, 4, 5, 2, 3]);
        (indexing, swap)
    }

    #[test]
    fn affected_variables_of_a_swap() {
        let (_, swap) = two_var_swap();
        assert!(!swap.identity());
        assert_eq!(swap.affected_vars(), &[0, 1]);
        assert_eq!(swap.image_of(0, 1), (1, 1));
    }

    #[test]
    fn identity_on_facts_despite_moved_operator_vertices() {
        let task = Task::new(vec![2], vec![0], vec![], vec![]).unwrap();
        let indexing = Rc::new(FactIndexing::new(&task));
        // two trailing operator vertices swapped, facts fixed
        let p = Permutation::from_raw(indexing, &[0, 1, 2, 4, 3]);
        assert!(p.identity());
        assert!(p.affected_vars().is_empty());
    }

    #[test]
    fn applies_to_value_vectors() {
        let (_, swap) = two_var_swap();
        assert_eq!(swap.apply_to_values(&[1, 0]), vec![0, 1]);
        assert_eq!(swap.apply_to_values(&[0, 0]), vec![0, 0]);
    }

    #[test]
    fn replace_if_less_only_improves() {
        let (_, swap) = two_var_swap();
        let mut values = vec![1, 0];
        assert!(swap.replace_if_less(&mut values));
        assert_eq!(values, vec![0, 1]);
        // already the smaller member of the orbit
        assert!(!swap.replace_if_less(&mut values));
        assert_eq!(values, vec![0, 1]);
    }

    #[test]
    fn cycle_structure() {
        let (_, swap) = two_var_swap();
        assert_eq!(swap.var_cycles(), vec![vec![0, 1]]);
        assert_eq!(swap.fact_cycles().len(), 2);
    }
}
