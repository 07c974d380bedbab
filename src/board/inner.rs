use std::collections::{HashMap, VecDeque};

use tokio::sync::oneshot;

use super::cell::{Cell, Position};

/// Outcome sent to a waiter blocked on rule 1-D.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    Released,
    Cancelled,
}

pub(crate) struct Waiter {
    pub(crate) id: u64,
    pub(crate) tx: oneshot::Sender<WaitOutcome>,
}

/// Per-player record of the positions flipped in the current turn.
#[derive(Debug, Clone, Default)]
pub(crate) struct PlayerState {
    pub(crate) first: Option<Position>,
    pub(crate) second: Option<Position>,
}

/// Everything the board monitor guards. Acquiring the monitor means holding
/// a lock on one of these; every method here assumes the caller already
/// holds that lock.
pub(crate) struct BoardInner {
    pub(crate) rows: usize,
    pub(crate) cols: usize,
    pub(crate) cells: Vec<Cell>,
    pub(crate) control: HashMap<Position, String>,
    pub(crate) players: HashMap<String, PlayerState>,
    pub(crate) waiters: HashMap<Position, VecDeque<Waiter>>,
    pub(crate) next_waiter_id: u64,
    pub(crate) watchers: Vec<(String, oneshot::Sender<String>)>,
    pub(crate) initial_tokens: Vec<String>,

    /// Test-only instrumentation: fired the instant a flip actually
    /// enqueues itself as a rule-1-D waiter on a position, so tests can
    /// await "the contending flip has actually blocked" instead of
    /// sleeping a fixed duration and hoping the scheduler got there first.
    #[cfg(test)]
    pub(crate) wait_probes: HashMap<Position, Vec<oneshot::Sender<()>>>,
    /// Test-only instrumentation: fired the instant `watch` registers a
    /// new one-shot in the watcher registry.
    #[cfg(test)]
    pub(crate) watcher_probes: Vec<oneshot::Sender<()>>,
}

impl BoardInner {
    pub(crate) fn idx(&self, pos: Position) -> usize {
        pos.row * self.cols + pos.col
    }

    fn controlled_by(&self, pos: Position, pid: &str) -> bool {
        self.control.get(&pos).map(|holder| holder == pid).unwrap_or(false)
    }

    pub(crate) fn turn_face_up(&mut self, pos: Position) -> bool {
        let idx = self.idx(pos);
        if let Cell::FaceDown(token) = &self.cells[idx] {
            let token = token.clone();
            self.cells[idx] = Cell::FaceUp(token);
            true
        } else {
            false
        }
    }

    fn turn_face_down(&mut self, pos: Position) -> bool {
        let idx = self.idx(pos);
        if let Cell::FaceUp(token) = &self.cells[idx] {
            let token = token.clone();
            self.cells[idx] = Cell::FaceDown(token);
            true
        } else {
            false
        }
    }

    fn remove_cell(&mut self, pos: Position) -> bool {
        let idx = self.idx(pos);
        if matches!(self.cells[idx], Cell::Empty) {
            false
        } else {
            self.cells[idx] = Cell::Empty;
            true
        }
    }

    /// Drops control of `pos` and pops its whole waiter queue for resolution
    /// by the caller once the monitor is released.
    pub(crate) fn relinquish(&mut self, pos: Position, pending: &mut Vec<Waiter>) {
        self.control.remove(&pos);
        if let Some(queue) = self.waiters.remove(&pos) {
            pending.extend(queue);
        }
    }

    /// Stage A: cleanup of the player's previous completed turn. Gated on
    /// `PlayerState.second` being set; a no-op otherwise. Returns whether
    /// any visible change occurred.
    pub(crate) fn run_stage_a(&mut self, pid: &str, target: Position, pending: &mut Vec<Waiter>) -> bool {
        let mut changed = false;

        let state = match self.players.get(pid) {
            Some(state) if state.second.is_some() => state.clone(),
            _ => return changed,
        };

        let f = state.first.expect("PlayerState.second set implies first set (I4)");
        let s = state.second.expect("checked above");

        if f == s {
            // The previous second flip failed on 1-A/1-B and only one
            // position is actually tracked. `f` was already relinquished by
            // that failure, so another player's queued waiter may have
            // since taken control of it; only turn it down if it's still
            // uncontrolled (same guard as the 3-B branch below).
            if f != target && !self.control.contains_key(&f) && self.turn_face_down(f) {
                changed = true;
            }
            self.players.insert(pid.to_string(), PlayerState::default());
            return changed;
        }

        let matched = self.controlled_by(f, pid) && self.controlled_by(s, pid);
        if matched {
            if self.remove_cell(f) {
                changed = true;
            }
            if self.remove_cell(s) {
                changed = true;
            }
            self.relinquish(f, pending);
            self.relinquish(s, pending);
        } else {
            for pos in [f, s] {
                if pos == target {
                    continue;
                }
                let idx = self.idx(pos);
                let present_uncontrolled_face_up =
                    self.cells[idx].is_face_up() && !self.control.contains_key(&pos);
                if present_uncontrolled_face_up && self.turn_face_down(pos) {
                    changed = true;
                }
            }
        }

        self.players.insert(pid.to_string(), PlayerState::default());
        changed
    }

    /// Stage C: second-card flip. Runs only when the player already had a
    /// first card going into this call (Stage B is skipped entirely).
    /// Returns whether any visible change occurred, plus the operation's
    /// result.
    pub(crate) fn run_stage_c(
        &mut self,
        pid: &str,
        f: Position,
        target: Position,
        pending: &mut Vec<Waiter>,
    ) -> (bool, Result<(), super::error::BoardError>) {
        use super::error::BoardError;

        let mut changed = false;
        let idx_t = self.idx(target);

        if matches!(self.cells[idx_t], Cell::Empty) {
            self.relinquish(f, pending);
            self.players.entry(pid.to_string()).or_default().second = Some(f);
            return (changed, Err(BoardError::NoCardAtPosition));
        }

        if self.control.contains_key(&target) {
            self.relinquish(f, pending);
            self.players.entry(pid.to_string()).or_default().second = Some(f);
            return (changed, Err(BoardError::CardAlreadyControlled));
        }

        if self.turn_face_up(target) {
            changed = true;
        }

        let f_idx = self.idx(f);
        let token_f = self.cells[f_idx].card().map(str::to_owned);
        let token_t = self.cells[idx_t].card().map(str::to_owned);
        let matched = token_f.is_some() && token_f == token_t;

        if matched {
            self.control.insert(target, pid.to_string());
            self.players.entry(pid.to_string()).or_default().second = Some(target);
        } else {
            self.relinquish(f, pending);
            self.players.entry(pid.to_string()).or_default().second = Some(target);
        }

        (changed, Ok(()))
    }

    pub(crate) fn render(&self, viewer_id: &str) -> String {
        let mut out = String::with_capacity(self.rows * self.cols * 8 + 16);
        out.push_str(&format!("{}x{}\n", self.rows, self.cols));
        for row in 0..self.rows {
            for col in 0..self.cols {
                let idx = row * self.cols + col;
                match &self.cells[idx] {
                    Cell::Empty => out.push_str("none\n"),
                    Cell::FaceDown(_) => out.push_str("down\n"),
                    Cell::FaceUp(token) => {
                        let pos = Position::new(row, col);
                        match self.control.get(&pos) {
                            Some(holder) if holder == viewer_id => {
                                out.push_str("my ");
                                out.push_str(token);
                                out.push('\n');
                            }
                            _ => {
                                out.push_str("up ");
                                out.push_str(token);
                                out.push('\n');
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// Asserts invariants I1–I6 (spec.md §3). Called at the end of every
    /// monitor-guarded section; a no-op in release builds. Deliberately
    /// `debug_assert!`-based: this is a development-time check of the
    /// implementation's own bookkeeping, not a user-facing validation.
    pub(crate) fn check_invariants(&self) {
        debug_assert!(self.rows > 0 && self.cols > 0, "I1: dimensions must be positive");
        debug_assert_eq!(self.cells.len(), self.rows * self.cols, "I1: cell count must match rows*cols");

        for cell in &self.cells {
            if let Some(token) = cell.card() {
                debug_assert!(
                    !token.is_empty() && !token.chars().any(char::is_whitespace),
                    "I2: card token must be non-empty with no whitespace, got {token:?}"
                );
            }
        }

        for (pos, pid) in &self.control {
            debug_assert!(
                pos.row < self.rows && pos.col < self.cols,
                "I3: control entry {pos} must be in bounds"
            );
            let idx = self.idx(*pos);
            debug_assert!(
                self.cells[idx].is_face_up(),
                "I3: controlled cell at {pos} must be present and face-up"
            );
            let references_pos = self
                .players
                .get(pid)
                .map(|state| state.first == Some(*pos) || state.second == Some(*pos))
                .unwrap_or(false);
            debug_assert!(
                references_pos,
                "I3: {pid}'s player state must reference {pos} as first or second"
            );
        }

        for (pid, state) in &self.players {
            if state.second.is_some() {
                debug_assert!(state.first.is_some(), "I4: second set implies first set for {pid}");
            }
            if let (Some(first), None) = (state.first, state.second) {
                debug_assert!(
                    self.controlled_by(first, pid),
                    "I5: {pid}'s sole first card at {first} must be controlled by {pid}"
                );
            }
            if let (Some(first), Some(second)) = (state.first, state.second) {
                if first != second && self.controlled_by(second, pid) {
                    debug_assert!(
                        self.controlled_by(first, pid),
                        "I6: {pid} controls second at {second} but not first at {first}"
                    );
                }
            }
        }
    }
}
