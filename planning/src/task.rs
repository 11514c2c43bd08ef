use anyhow::{ensure, Result};
use std::fmt::{Display, Error, Formatter};
use std::num::NonZeroU32;

/// A variable/value pair, i.e. a single grounded fact of the task.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct FactPair {
    pub var: usize,
    pub value: usize,
}

impl FactPair {
    pub fn new(var: usize, value: usize) -> FactPair {
        FactPair { var, value }
    }
}

impl Display for FactPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "v{}={}", self.var, self.value)
    }
}

/// Compact, numeric identifier of a grounded operator.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct OperatorId(NonZeroU32);

impl OperatorId {
    pub fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

impl From<usize> for OperatorId {
    fn from(i: usize) -> Self {
        OperatorId(NonZeroU32::new(i as u32 + 1).unwrap())
    }
}

impl From<OperatorId> for usize {
    fn from(op: OperatorId) -> Self {
        op.index()
    }
}

impl Display for OperatorId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "o{}", self.index())
    }
}

/// A grounded operator: preconditions and effects are conjunctions of facts,
/// with at most one fact per variable.
pub struct Operator {
    pub name: String,
    pub pre: Vec<FactPair>,
    pub eff: Vec<FactPair>,
    pub cost: i32,
}

/// A grounded planning task over multi-valued variables.
///
/// Variable `v` ranges over `0..domain_size(v)`. Facts are identified by
/// [FactPair]s; the mapping to the flat fact-index space used by the symmetry
/// layer lives with that layer, not here. Variables and facts carry names
/// used only by diagnostic dumps.
pub struct Task {
    domain_sizes: Vec<usize>,
    variable_names: Vec<String>,
    fact_names: Vec<Vec<String>>,
    initial_values: Vec<usize>,
    goal: Vec<FactPair>,
    operators: Vec<Operator>,
}

impl Task {
    /// Builds a task with generated `v0`, `v0=1`-style names.
    pub fn new(
        domain_sizes: Vec<usize>,
        initial_values: Vec<usize>,
        goal: Vec<FactPair>,
        operators: Vec<Operator>,
    ) -> Result<Task> {
        let variable_names = (0..domain_sizes.len()).map(|var| format!("v{var}")).collect();
        let fact_names = domain_sizes
            .iter()
            .enumerate()
            .map(|(var, &dom)| (0..dom).map(|val| format!("v{var}={val}")).collect())
            .collect();
        Task::with_names(
            domain_sizes,
            variable_names,
            fact_names,
            initial_values,
            goal,
            operators,
        )
    }

    /// Builds a task whose variables and facts keep the names of the input
    /// they were grounded from.
    pub fn with_names(
        domain_sizes: Vec<usize>,
        variable_names: Vec<String>,
        fact_names: Vec<Vec<String>>,
        initial_values: Vec<usize>,
        goal: Vec<FactPair>,
        operators: Vec<Operator>,
    ) -> Result<Task> {
        ensure!(
            variable_names.len() == domain_sizes.len(),
            "{} variable names for {} variables",
            variable_names.len(),
            domain_sizes.len()
        );
        ensure!(
            fact_names.len() == domain_sizes.len()
                && fact_names
                    .iter()
                    .zip(&domain_sizes)
                    .all(|(names, &dom)| names.len() == dom),
            "Fact names do not cover the variable domains"
        );
        ensure!(
            initial_values.len() == domain_sizes.len(),
            "Initial state has {} values but the task has {} variables",
            initial_values.len(),
            domain_sizes.len()
        );
        let in_domain = |f: &FactPair| f.var < domain_sizes.len() && f.value < domain_sizes[f.var];
        for (var, (&dom, &val)) in domain_sizes.iter().zip(&initial_values).enumerate() {
            ensure!(dom >= 1, "Variable v{var} has an empty domain");
            ensure!(val < dom, "Initial value {val} of v{var} outside its domain");
        }
        ensure!(goal.iter().all(in_domain), "Goal fact outside variable domains");
        for op in &operators {
            ensure!(
                op.pre.iter().all(in_domain) && op.eff.iter().all(in_domain),
                "Operator {} mentions a fact outside variable domains",
                op.name
            );
            ensure!(op.cost >= 0, "Operator {} has negative cost", op.name);
        }
        Ok(Task {
            domain_sizes,
            variable_names,
            fact_names,
            initial_values,
            goal,
            operators,
        })
    }

    pub fn num_variables(&self) -> usize {
        self.domain_sizes.len()
    }

    pub fn domain_size(&self, var: usize) -> usize {
        self.domain_sizes[var]
    }

    pub fn variable_name(&self, var: usize) -> &str {
        &self.variable_names[var]
    }

    pub fn fact_name(&self, fact: FactPair) -> &str {
        &self.fact_names[fact.var][fact.value]
    }

    pub fn domain_sizes(&self) -> &[usize] {
        &self.domain_sizes
    }

    /// Total number of facts, over all variables.
    pub fn num_facts(&self) -> usize {
        self.domain_sizes.iter().sum()
    }

    pub fn initial_values(&self) -> &[usize] {
        &self.initial_values
    }

    pub fn goal(&self) -> &[FactPair] {
        &self.goal
    }

    pub fn num_operators(&self) -> usize {
        self.operators.len()
    }

    pub fn operator_ids(&self) -> impl Iterator<Item = OperatorId> {
        (0..self.operators.len()).map(OperatorId::from)
    }

    pub fn operator(&self, op: OperatorId) -> &Operator {
        &self.operators[op.index()]
    }

    pub fn is_applicable(&self, op: OperatorId, values: &[usize]) -> bool {
        self.operator(op).pre.iter().all(|f| values[f.var] == f.value)
    }

    pub fn applicable_operators<'a>(&'a self, values: &'a [usize]) -> impl Iterator<Item = OperatorId> + 'a {
        self.operator_ids().filter(move |&op| self.is_applicable(op, values))
    }

    pub fn is_goal(&self, values: &[usize]) -> bool {
        self.goal.iter().all(|f| values[f.var] == f.value)
    }
}
