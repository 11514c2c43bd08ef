use itertools::Itertools;
use std::fmt::{Display, Error, Formatter};
use std::num::NonZeroU32;

/// Identifier of a registered state, assigned densely by the [StateRegistry]
/// that owns the packed representation.
///
/// [StateRegistry]: crate::registry::StateRegistry
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub struct StateId(NonZeroU32);

impl StateId {
    pub fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

impl From<usize> for StateId {
    fn from(i: usize) -> Self {
        StateId(NonZeroU32::new(i as u32 + 1).unwrap())
    }
}

impl From<StateId> for usize {
    fn from(id: StateId) -> Self {
        id.index()
    }
}

impl Display for StateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "#{}", self.index())
    }
}

/// An unpacked state: the value of every task variable, together with the id
/// under which the packed form is registered.
///
/// The registry owns the packed storage; a `State` is a per-call copy and is
/// cheap to clone for the small tasks the search layer traces through.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct State {
    id: StateId,
    values: Vec<usize>,
}

impl State {
    pub(crate) fn new(id: StateId, values: Vec<usize>) -> State {
        State { id, values }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn value(&self, var: usize) -> usize {
        self.values[var]
    }

    pub fn values(&self) -> &[usize] {
        &self.values
    }

    pub fn num_variables(&self) -> usize {
        self.values.len()
    }
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "[{}]", self.values.iter().format(" "))
    }
}
