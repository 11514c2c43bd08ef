use crate::symmetries::{raw, Group, Permutation, SearchSymmetries};
use orbit_planning::{OperatorId, State, StateId, StateRegistry, Task};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum NodeStatus {
    New,
    Open,
    Closed,
    DeadEnd,
}

/// Per-state search information: status, costs and the parent link needed to
/// reconstruct a plan. One slot per registered state, defaulted to an
/// untouched `New` node.
#[derive(Clone, Debug)]
pub struct SearchNodeInfo {
    status: NodeStatus,
    g: i32,
    real_g: i32,
    parent_state_id: Option<StateId>,
    creating_operator: Option<OperatorId>,
}

impl Default for SearchNodeInfo {
    fn default() -> SearchNodeInfo {
        SearchNodeInfo {
            status: NodeStatus::New,
            g: 0,
            real_g: 0,
            parent_state_id: None,
            creating_operator: None,
        }
    }
}

/// Snapshot of a node used when opening its successors, so that no two node
/// handles need to be alive at once.
#[derive(Copy, Clone, Debug)]
pub struct ParentLink {
    pub state_id: StateId,
    pub g: i32,
    pub real_g: i32,
}

/// Short-lived mutable handle on the info slot of one state.
///
/// Handles alias the search space's storage; taking a second handle requires
/// giving this one up, which rules out concurrent handles on the same state
/// by construction.
pub struct SearchNode<'a> {
    state: State,
    info: &'a mut SearchNodeInfo,
}

impl SearchNode<'_> {
    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn is_new(&self) -> bool {
        self.info.status == NodeStatus::New
    }

    pub fn is_open(&self) -> bool {
        self.info.status == NodeStatus::Open
    }

    pub fn is_closed(&self) -> bool {
        self.info.status == NodeStatus::Closed
    }

    pub fn is_dead_end(&self) -> bool {
        self.info.status == NodeStatus::DeadEnd
    }

    /// Path cost under the adjusted cost scheme of the search.
    pub fn g(&self) -> i32 {
        debug_assert!(self.info.g >= 0);
        self.info.g
    }

    /// Path cost in the task's own cost model.
    pub fn real_g(&self) -> i32 {
        self.info.real_g
    }

    pub fn parent_state_id(&self) -> Option<StateId> {
        self.info.parent_state_id
    }

    pub fn creating_operator(&self) -> Option<OperatorId> {
        self.info.creating_operator
    }

    pub fn as_parent(&self) -> ParentLink {
        ParentLink {
            state_id: self.state.id(),
            g: self.info.g,
            real_g: self.info.real_g,
        }
    }

    pub fn open_initial(&mut self) {
        assert!(self.info.status == NodeStatus::New);
        self.info.status = NodeStatus::Open;
        self.info.g = 0;
        self.info.real_g = 0;
        self.info.parent_state_id = None;
        self.info.creating_operator = None;
    }

    pub fn open(&mut self, parent: &ParentLink, op: OperatorId, op_cost: i32, adjusted_cost: i32) {
        assert!(self.info.status == NodeStatus::New);
        self.info.status = NodeStatus::Open;
        self.set_parent(parent, op, op_cost, adjusted_cost);
    }

    /// Reopening is legal from `Closed` as well: with an inconsistent
    /// heuristic a cheaper path to an already closed node can turn up later.
    pub fn reopen(&mut self, parent: &ParentLink, op: OperatorId, op_cost: i32, adjusted_cost: i32) {
        assert!(self.info.status == NodeStatus::Open || self.info.status == NodeStatus::Closed);
        self.info.status = NodeStatus::Open;
        self.set_parent(parent, op, op_cost, adjusted_cost);
    }

    /// Like [Self::reopen], except the status is left unchanged.
    pub fn update_parent(
        &mut self,
        parent: &ParentLink,
        op: OperatorId,
        op_cost: i32,
        adjusted_cost: i32,
    ) {
        assert!(self.info.status == NodeStatus::Open || self.info.status == NodeStatus::Closed);
        self.set_parent(parent, op, op_cost, adjusted_cost);
    }

    fn set_parent(&mut self, parent: &ParentLink, op: OperatorId, op_cost: i32, adjusted_cost: i32) {
        self.info.g = parent.g + adjusted_cost;
        self.info.real_g = parent.real_g + op_cost;
        self.info.parent_state_id = Some(parent.state_id);
        self.info.creating_operator = Some(op);
    }

    pub fn close(&mut self) {
        assert!(self.info.status == NodeStatus::Open);
        self.info.status = NodeStatus::Closed;
    }

    pub fn mark_as_dead_end(&mut self) {
        self.info.status = NodeStatus::DeadEnd;
    }

    pub fn dump(&self, task: &Task) {
        match self.info.creating_operator {
            Some(op) => debug!(
                "{}: {} created by {} from {}",
                self.state.id(),
                self.state,
                task.operator(op).name,
                self.info.parent_state_id.expect("non-root node without parent link"),
            ),
            None => debug!("{}: {} no parent", self.state.id(), self.state),
        }
    }
}

#[derive(Error, Debug)]
pub enum TraceError {
    /// Two consecutive states of the reconstructed trace are not connected by
    /// any applicable operator: either the search space is corrupt or the
    /// symmetry bookkeeping went wrong.
    #[error("no applicable operator connects two consecutive states of the plan trace")]
    NoConnectingOperator {
        from_values: Vec<usize>,
        to_values: Vec<usize>,
    },
}

/// Registry pair used during symmetry-aware plan reconstruction.
///
/// Under DKS, successors must be generated in a registry separate from the
/// search registry, whose ids would otherwise collide with re-canonicalized
/// states; under OSS the search registry already stores canonical
/// representatives and is reused directly.
struct TraceRegistries<'r, 't> {
    main: &'r mut StateRegistry<'t>,
    dks: Option<StateRegistry<'t>>,
}

impl TraceRegistries<'_, '_> {
    fn lookup(&self, id: StateId) -> State {
        self.main.lookup_state(id)
    }

    fn successor(&mut self, state: &State, op: OperatorId) -> State {
        match &mut self.dks {
            Some(registry) => registry.get_successor_state(state, op),
            None => self.main.get_successor_state(state, op),
        }
    }

    fn permute(&mut self, state: &State, permutation: &Permutation) -> State {
        match &mut self.dks {
            Some(registry) => {
                registry.permute_state(state, |values| permutation.apply_to_values(values))
            }
            None => self
                .main
                .permute_state(state, |values| permutation.apply_to_values(values)),
        }
    }
}

/// Indexed container of [SearchNodeInfo] over the states of one registry.
///
/// The search space refers to the registry only through the dense state ids;
/// it owns no states itself and must not outlive the registry whose ids it
/// indexes.
#[derive(Default)]
pub struct SearchSpace {
    infos: Vec<SearchNodeInfo>,
}

impl SearchSpace {
    pub fn new() -> SearchSpace {
        SearchSpace::default()
    }

    pub fn get_node(&mut self, state: &State) -> SearchNode<'_> {
        let index = state.id().index();
        if self.infos.len() <= index {
            self.infos.resize_with(index + 1, Default::default);
        }
        SearchNode {
            state: state.clone(),
            info: &mut self.infos[index],
        }
    }

    fn info(&self, id: StateId) -> &SearchNodeInfo {
        &self.infos[id.index()]
    }

    /// Reconstructs the operator sequence from the initial state to
    /// `goal_state`.
    ///
    /// With a symmetry group that actually found generators, the recorded
    /// parent links may refer to symmetric images of the real predecessors
    /// and the symmetry-aware algorithm is used; otherwise this is a plain
    /// reverse walk along the parent links.
    pub fn trace_path(
        &self,
        goal_state: &State,
        registry: &mut StateRegistry,
        group: Option<&Group>,
    ) -> Result<Vec<OperatorId>, TraceError> {
        if let Some(group) = group {
            if group.has_symmetries() {
                return self.trace_path_with_symmetries(goal_state, registry, group);
            }
        }
        let mut path = Vec::new();
        let mut current = goal_state.id();
        loop {
            let info = self.info(current);
            let Some(op) = info.creating_operator else {
                debug_assert!(info.parent_state_id.is_none());
                break;
            };
            path.push(op);
            current = info.parent_state_id.expect("non-root node without parent link");
        }
        path.reverse();
        Ok(path)
    }

    fn trace_path_with_symmetries(
        &self,
        goal_state: &State,
        registry: &mut StateRegistry,
        group: &Group,
    ) -> Result<Vec<OperatorId>, TraceError> {
        let task = registry.task();
        let dks = group.search_symmetries() == SearchSymmetries::Dks;
        let mut registries = TraceRegistries {
            dks: dks.then(|| StateRegistry::new(task)),
            main: registry,
        };

        // Phase 1: walk the parent links backwards, recording for every step
        // the group element that carries the stored state to the state the
        // recorded operator actually produces.
        let mut permutations: Vec<raw::RawPermutation> = Vec::new();
        let mut state_trace: Vec<State> = Vec::new();
        let mut current_state = goal_state.clone();
        loop {
            let info = self.info(current_state.id());
            debug_assert!(info.status != NodeStatus::New);
            state_trace.push(current_state.clone());
            let Some(op) = info.creating_operator else {
                permutations.push(group.identity_raw_permutation());
                break;
            };
            let parent = registries.lookup(
                info.parent_state_id.expect("non-root node without parent link"),
            );
            let applied = registries.successor(&parent, op);
            let permutation = if applied.values() != current_state.values() {
                group.create_permutation_from_state_to_state(&current_state, &applied)
            } else {
                group.identity_raw_permutation()
            };
            permutations.push(permutation);
            current_state = parent;
        }
        debug_assert_eq!(state_trace.len(), permutations.len());

        // Phase 2: suffix products, so that reverse_permutations[n-1-i]
        // un-does every symmetry applied to the right of state_trace[i].
        let mut reverse_permutations: Vec<raw::RawPermutation> =
            Vec::with_capacity(permutations.len());
        let mut accumulated = group.identity_raw_permutation();
        while let Some(permutation) = permutations.pop() {
            accumulated = raw::compose(&permutation, &accumulated);
            reverse_permutations.push(accumulated.clone());
        }

        // Phase 3: rewrite the trace; afterwards consecutive entries are
        // connected by a concrete applicable operator.
        let n = state_trace.len();
        for i in 0..n {
            let lifted = Permutation::from_raw(
                group.indexing().clone(),
                &reverse_permutations[n - i - 1],
            );
            state_trace[i] = registries.permute(&state_trace[i], &lifted);
        }

        // Phase 4: between consecutive trace states, pick the cheapest
        // connecting operator (ties broken by enumeration order).
        let mut path = Vec::new();
        for i in (1..n).rev() {
            let applicable: Vec<OperatorId> =
                task.applicable_operators(state_trace[i].values()).collect();
            let mut best: Option<(OperatorId, i32)> = None;
            for op in applicable {
                let successor = registries.successor(&state_trace[i], op);
                if successor.values() == state_trace[i - 1].values() {
                    let cost = task.operator(op).cost;
                    if best.is_none_or(|(_, best_cost)| cost < best_cost) {
                        best = Some((op, cost));
                    }
                }
            }
            let Some((op, _)) = best else {
                error!(
                    "No operator is found! Cannot reach the state {} from the state {}",
                    state_trace[i - 1],
                    state_trace[i]
                );
                return Err(TraceError::NoConnectingOperator {
                    from_values: state_trace[i].values().to_vec(),
                    to_values: state_trace[i - 1].values().to_vec(),
                });
            };
            path.push(op);
        }
        Ok(path)
    }

    /// Logs every registered state with its parent link.
    pub fn dump(&self, task: &Task, registry: &StateRegistry) {
        for id in registry.state_ids() {
            let state = registry.lookup_state(id);
            let info = self.infos.get(id.index()).cloned().unwrap_or_default();
            match (info.creating_operator, info.parent_state_id) {
                (Some(op), Some(parent)) => debug!(
                    "{id}: {state} created by {} from {parent}",
                    task.operator(op).name
                ),
                _ => debug!("{id}: {state} has no parent"),
            }
        }
    }
}
