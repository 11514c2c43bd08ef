//! Grounded planning tasks in finite-domain representation: variables over
//! finite domains, operators with precondition/effect pairs, packed state
//! storage and the state registry consumed by the search layer.

pub mod packer;
pub mod registry;
pub mod state;
pub mod task;

pub use packer::StatePacker;
pub use registry::StateRegistry;
pub use state::{State, StateId};
pub use task::{FactPair, Operator, OperatorId, Task};
