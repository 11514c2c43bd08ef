use std::cell::Cell;
use std::rc::Rc;
use tracing::info;

/// Counters for the symmetrical-lookups machinery.
///
/// Shared between the wrapping heuristic, which feeds them, and the search
/// statistics, which report them. They are advisory: nothing in the search
/// depends on their values. Reset happens at search start.
#[derive(Default)]
pub struct LookupStats {
    symmetrical_states_generated: Cell<usize>,
    symmetry_improved_evaluations: Cell<usize>,
    improving_symmetrical_states: Cell<usize>,
}

impl LookupStats {
    pub fn reset(&self) {
        self.symmetrical_states_generated.set(0);
        self.symmetry_improved_evaluations.set(0);
        self.improving_symmetrical_states.set(0);
    }

    pub fn add_generated_states(&self, count: usize) {
        self.symmetrical_states_generated
            .set(self.symmetrical_states_generated.get() + count);
    }

    /// One evaluation whose final value beat the unwrapped one.
    pub fn count_improved_evaluation(&self) {
        self.symmetry_improved_evaluations
            .set(self.symmetry_improved_evaluations.get() + 1);
    }

    /// One symmetric image that improved on the unwrapped value.
    pub fn count_improving_state(&self) {
        self.improving_symmetrical_states
            .set(self.improving_symmetrical_states.get() + 1);
    }

    pub fn generated_states(&self) -> usize {
        self.symmetrical_states_generated.get()
    }

    pub fn improved_evaluations(&self) -> usize {
        self.symmetry_improved_evaluations.get()
    }

    pub fn improving_states(&self) -> usize {
        self.improving_symmetrical_states.get()
    }
}

/// Bookkeeping of one search run, with progress reporting on f-value jumps.
pub struct SearchStatistics {
    lookup_stats: Rc<LookupStats>,

    expanded_states: usize,
    reopened_states: usize,
    evaluated_states: usize,
    evaluations: usize,
    generated_states: usize,
    dead_end_states: usize,

    lastjump_expanded_states: usize,
    lastjump_reopened_states: usize,
    lastjump_evaluated_states: usize,
    lastjump_generated_states: usize,
    lastjump_symmetrical_states_generated: usize,
    lastjump_symmetry_improved_evaluations: usize,
    lastjump_improving_symmetrical_states: usize,

    lastjump_f_value: i32,
}

impl SearchStatistics {
    pub fn new(lookup_stats: Rc<LookupStats>) -> SearchStatistics {
        lookup_stats.reset();
        SearchStatistics {
            lookup_stats,
            expanded_states: 0,
            reopened_states: 0,
            evaluated_states: 0,
            evaluations: 0,
            generated_states: 0,
            dead_end_states: 0,
            lastjump_expanded_states: 0,
            lastjump_reopened_states: 0,
            lastjump_evaluated_states: 0,
            lastjump_generated_states: 0,
            lastjump_symmetrical_states_generated: 0,
            lastjump_symmetry_improved_evaluations: 0,
            lastjump_improving_symmetrical_states: 0,
            lastjump_f_value: -1,
        }
    }

    pub fn inc_expanded(&mut self) {
        self.expanded_states += 1;
    }

    pub fn inc_reopened(&mut self) {
        self.reopened_states += 1;
    }

    pub fn inc_evaluated_states(&mut self) {
        self.evaluated_states += 1;
    }

    pub fn inc_evaluations(&mut self) {
        self.evaluations += 1;
    }

    pub fn inc_generated(&mut self) {
        self.generated_states += 1;
    }

    pub fn inc_dead_ends(&mut self) {
        self.dead_end_states += 1;
    }

    pub fn expanded(&self) -> usize {
        self.expanded_states
    }

    pub fn reopened(&self) -> usize {
        self.reopened_states
    }

    pub fn evaluated_states(&self) -> usize {
        self.evaluated_states
    }

    pub fn generated(&self) -> usize {
        self.generated_states
    }

    /// Reports a line whenever the best f value in the open list increases.
    pub fn report_f_value_progress(&mut self, f: i32) {
        if f > self.lastjump_f_value {
            self.lastjump_f_value = f;
            self.print_f_line();
            self.lastjump_expanded_states = self.expanded_states;
            self.lastjump_reopened_states = self.reopened_states;
            self.lastjump_evaluated_states = self.evaluated_states;
            self.lastjump_generated_states = self.generated_states;
            self.lastjump_symmetrical_states_generated = self.lookup_stats.generated_states();
            self.lastjump_symmetry_improved_evaluations = self.lookup_stats.improved_evaluations();
            self.lastjump_improving_symmetrical_states = self.lookup_stats.improving_states();
        }
    }

    fn basic_statistics(&self) -> String {
        let mut line = format!(
            "{} evaluated, {} expanded",
            self.evaluated_states, self.expanded_states
        );
        if self.reopened_states > 0 {
            line.push_str(&format!(", {} reopened", self.reopened_states));
        }
        line
    }

    fn print_f_line(&self) {
        info!("f = {}, {}", self.lastjump_f_value, self.basic_statistics());
    }

    pub fn print_checkpoint_line(&self, g: i32) {
        info!("g={}, {}", g, self.basic_statistics());
    }

    pub fn print_detailed_statistics(&self) {
        info!("Expanded {} state(s).", self.expanded_states);
        info!("Reopened {} state(s).", self.reopened_states);
        info!("Evaluated {} state(s).", self.evaluated_states);
        info!("Evaluations: {}", self.evaluations);
        info!("Generated {} state(s).", self.generated_states);
        info!("Dead ends: {} state(s).", self.dead_end_states);
        info!(
            "Symmetrical states generated: {}",
            self.lookup_stats.generated_states()
        );
        info!(
            "Symmetry-improved evaluations: {}",
            self.lookup_stats.improved_evaluations()
        );
        info!(
            "Improving symmetrical states: {}",
            self.lookup_stats.improving_states()
        );
        if self.lastjump_f_value >= 0 {
            info!(
                "Expanded until last jump: {} state(s).",
                self.lastjump_expanded_states
            );
            info!(
                "Reopened until last jump: {} state(s).",
                self.lastjump_reopened_states
            );
            info!(
                "Evaluated until last jump: {} state(s).",
                self.lastjump_evaluated_states
            );
            info!(
                "Generated until last jump: {} state(s).",
                self.lastjump_generated_states
            );
            info!(
                "Symmetrical states generated until last jump: {} state(s).",
                self.lastjump_symmetrical_states_generated
            );
            info!(
                "Symmetry-improved evaluations until last jump: {}",
                self.lastjump_symmetry_improved_evaluations
            );
            info!(
                "Improving symmetrical states until last jump: {}",
                self.lastjump_improving_symmetrical_states
            );
        }
    }
}
