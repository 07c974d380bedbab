//! The concurrent Memory Scramble board: a thread-safe grid of cards that
//! serialises mutation against a single monitor, suspends flips that
//! contend for a controlled card, and fans out visibility-change
//! notifications to long-poll watchers.

mod cell;
mod error;
mod inner;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

pub use cell::Position;
pub use error::{BoardError, BoardResult};

use cell::Cell;
use inner::{BoardInner, PlayerState, WaitOutcome, Waiter};

const LOG_TARGET: &str = "board";

/// The concurrent Memory board. Cheap to share across tasks behind an
/// `Arc<Board>`; every public method takes `&self`.
pub struct Board {
    rows: usize,
    cols: usize,
    inner: Mutex<BoardInner>,
}

fn validate_token(token: &str) -> BoardResult<()> {
    if token.is_empty() || token.chars().any(char::is_whitespace) {
        return Err(BoardError::BadArgument(format!(
            "card token must be non-empty and contain no whitespace, got {token:?}"
        )));
    }
    Ok(())
}

fn validate_identity(id: &str, what: &str) -> BoardResult<()> {
    if id.trim().is_empty() {
        return Err(BoardError::BadArgument(format!("{what} must not be blank")));
    }
    Ok(())
}

impl Board {
    /// Builds a board from a row count, a column count, and `rows * cols`
    /// tokens in row-major order. Every cell starts face-down. The token
    /// sequence is retained as the initial-card snapshot for `reset`.
    pub fn new(rows: usize, cols: usize, tokens: Vec<String>) -> BoardResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(BoardError::BadArgument(
                "rows and cols must both be positive".into(),
            ));
        }
        if tokens.len() != rows * cols {
            return Err(BoardError::BadArgument(format!(
                "expected {} tokens for a {rows}x{cols} board, got {}",
                rows * cols,
                tokens.len()
            )));
        }
        for token in &tokens {
            validate_token(token)?;
        }

        let cells = tokens.iter().cloned().map(Cell::FaceDown).collect();

        Ok(Board {
            rows,
            cols,
            inner: Mutex::new(BoardInner {
                rows,
                cols,
                cells,
                control: HashMap::new(),
                players: HashMap::new(),
                waiters: HashMap::new(),
                next_waiter_id: 0,
                watchers: Vec::new(),
                initial_tokens: tokens,
                #[cfg(test)]
                wait_probes: HashMap::new(),
                #[cfg(test)]
                watcher_probes: Vec::new(),
            }),
        })
    }

    /// Fixed for the board's lifetime (I1); no lock needed.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// §4.2 — a deterministic per-viewer rendering of the board.
    pub async fn view(&self, viewer_id: &str) -> BoardResult<String> {
        validate_identity(viewer_id, "viewer id")?;
        let guard = self.inner.lock().await;
        Ok(guard.render(viewer_id))
    }

    /// §4.3 — the nine-case flip state machine, with no externally wired
    /// cancellation signal (equivalent to `flip_cancellable` with a token
    /// that is never cancelled).
    pub async fn flip(&self, pid: &str, row: usize, col: usize) -> BoardResult<()> {
        self.flip_inner(pid, row, col, None).await
    }

    /// As `flip`, but a waiting 1-D stall can be unblocked by an external
    /// cancellation signal. On cancellation the flip removes its own
    /// waiter entry before propagating `Cancelled`.
    pub async fn flip_cancellable(
        &self,
        pid: &str,
        row: usize,
        col: usize,
        cancel: CancellationToken,
    ) -> BoardResult<()> {
        self.flip_inner(pid, row, col, Some(cancel)).await
    }

    async fn flip_inner(
        &self,
        pid: &str,
        row: usize,
        col: usize,
        cancel: Option<CancellationToken>,
    ) -> BoardResult<()> {
        validate_identity(pid, "player id")?;

        let mut guard = self.inner.lock().await;
        if row >= guard.rows || col >= guard.cols {
            return Err(BoardError::BadArgument(format!(
                "position ({row}, {col}) is out of bounds for a {}x{} board",
                guard.rows, guard.cols
            )));
        }
        let target = Position::new(row, col);

        let mut pending: Vec<Waiter> = Vec::new();
        let mut changed = guard.run_stage_a(pid, target, &mut pending);

        let first_already_set = guard.players.get(pid).and_then(|p| p.first).is_some();

        if first_already_set {
            let f = guard
                .players
                .get(pid)
                .and_then(|p| p.first)
                .expect("checked above");
            let (stage_changed, result) = guard.run_stage_c(pid, f, target, &mut pending);
            changed |= stage_changed;
            guard.check_invariants();
            drop(guard);
            self.flush(pending, changed).await;
            return result;
        }

        // Stage B, including the rule-1-D wait loop.
        loop {
            let idx = guard.idx(target);
            if matches!(guard.cells[idx], Cell::Empty) {
                guard.check_invariants();
                drop(guard);
                self.flush(pending, changed).await;
                return Err(BoardError::NoCardAtPosition);
            }

            let contested = guard
                .control
                .get(&target)
                .map(|holder| holder != pid)
                .unwrap_or(false);

            if contested {
                let (tx, rx) = oneshot::channel();
                let waiter_id = guard.next_waiter_id;
                guard.next_waiter_id += 1;
                guard
                    .waiters
                    .entry(target)
                    .or_default()
                    .push_back(Waiter { id: waiter_id, tx });

                #[cfg(test)]
                {
                    if let Some(probes) = guard.wait_probes.remove(&target) {
                        for probe in probes {
                            let _ = probe.send(());
                        }
                    }
                }

                guard.check_invariants();
                drop(guard);

                // Flush what's accumulated so far before suspending; the
                // monitor is about to be released for an unbounded wait.
                self.flush(
                    std::mem::take(&mut pending),
                    std::mem::replace(&mut changed, false),
                )
                .await;

                let outcome = match cancel.as_ref() {
                    Some(token) => {
                        tokio::select! {
                            res = rx => res,
                            _ = token.cancelled() => {
                                let mut g = self.inner.lock().await;
                                if let Some(queue) = g.waiters.get_mut(&target) {
                                    queue.retain(|w| w.id != waiter_id);
                                    if queue.is_empty() {
                                        g.waiters.remove(&target);
                                    }
                                }
                                g.check_invariants();
                                drop(g);
                                tracing::debug!(
                                    target: LOG_TARGET,
                                    pid,
                                    %target,
                                    "flip cancelled while waiting on rule 1-D"
                                );
                                return Err(BoardError::Cancelled);
                            }
                        }
                    }
                    None => rx.await,
                };

                match outcome {
                    Ok(WaitOutcome::Released) => {
                        guard = self.inner.lock().await;
                        continue;
                    }
                    Ok(WaitOutcome::Cancelled) => return Err(BoardError::Cancelled),
                    Err(_) => return Err(BoardError::Cancelled),
                }
            }

            if guard.turn_face_up(target) {
                changed = true;
            }
            guard.control.insert(target, pid.to_string());
            guard.players.entry(pid.to_string()).or_default().first = Some(target);
            break;
        }

        guard.check_invariants();
        drop(guard);
        self.flush(pending, changed).await;
        Ok(())
    }

    /// §4.4 — applies an asynchronous token transform to every distinct
    /// card value currently on the board. `f` is assumed pure: calling it
    /// twice with the same input must yield the same output.
    pub async fn map<F, Fut>(&self, f: F) -> BoardResult<()>
    where
        F: Fn(String) -> Fut + Send + Sync,
        Fut: Future<Output = Option<String>> + Send,
    {
        let groups: HashMap<String, Vec<Position>> = {
            let guard = self.inner.lock().await;
            let mut groups: HashMap<String, Vec<Position>> = HashMap::new();
            for row in 0..guard.rows {
                for col in 0..guard.cols {
                    let idx = row * guard.cols + col;
                    if let Some(token) = guard.cells[idx].card() {
                        groups
                            .entry(token.to_string())
                            .or_default()
                            .push(Position::new(row, col));
                    }
                }
            }
            groups
        };

        let computed = futures::future::join_all(groups.into_iter().map(|(token, positions)| {
            let fut = f(token.clone());
            async move {
                let result = fut.await;
                (token, result, positions)
            }
        }))
        .await;

        let mut to_apply: Vec<(String, String, Vec<Position>)> = Vec::new();
        for (original, result, positions) in computed {
            let new_token = result.ok_or_else(|| {
                BoardError::BadArgument(format!(
                    "map transformer returned no value for token {original:?}"
                ))
            })?;
            validate_token(&new_token).map_err(|_| {
                BoardError::BadArgument(format!(
                    "map transformer produced an invalid token {new_token:?}"
                ))
            })?;
            if new_token == original {
                continue;
            }
            to_apply.push((original, new_token, positions));
        }

        for (original, new_token, positions) in to_apply {
            let mut guard = self.inner.lock().await;
            let mut group_changed = false;
            for pos in positions {
                let idx = guard.idx(pos);
                if guard.cells[idx].card() == Some(original.as_str()) {
                    guard.cells[idx] = match &guard.cells[idx] {
                        Cell::FaceDown(_) => Cell::FaceDown(new_token.clone()),
                        Cell::FaceUp(_) => Cell::FaceUp(new_token.clone()),
                        Cell::Empty => unreachable!("filtered out of the snapshot above"),
                    };
                    group_changed = true;
                }
            }
            guard.check_invariants();
            drop(guard);
            if group_changed {
                self.notify_watchers().await;
            }
        }

        Ok(())
    }

    /// §4.5 — registers a one-shot watcher and awaits the next visible
    /// change, returning that change's rendering for `viewer_id`.
    pub async fn watch(&self, viewer_id: &str) -> BoardResult<String> {
        validate_identity(viewer_id, "viewer id")?;
        let (tx, rx) = oneshot::channel();
        {
            let mut guard = self.inner.lock().await;
            guard.watchers.push((viewer_id.to_string(), tx));

            #[cfg(test)]
            {
                for probe in guard.watcher_probes.drain(..) {
                    let _ = probe.send(());
                }
            }
        }
        rx.await.map_err(|_| BoardError::Cancelled)
    }

    /// §4.6 — restores every cell to its initial token face-down, clears
    /// control and player state, rejects every pending waiter with
    /// `Cancelled`, and unconditionally fans out to watchers.
    pub async fn reset(&self) {
        let rejected = {
            let mut guard = self.inner.lock().await;
            for (idx, token) in guard.initial_tokens.clone().into_iter().enumerate() {
                guard.cells[idx] = Cell::FaceDown(token);
            }
            guard.control.clear();
            guard.players.clear();

            let mut rejected = Vec::new();
            for (_, queue) in guard.waiters.drain() {
                rejected.extend(queue);
            }
            guard.check_invariants();
            rejected
        };

        for waiter in rejected {
            let _ = waiter.tx.send(WaitOutcome::Cancelled);
        }
        self.notify_watchers().await;
    }

    async fn flush(&self, pending: Vec<Waiter>, changed: bool) {
        for waiter in pending {
            let _ = waiter.tx.send(WaitOutcome::Released);
        }
        if changed {
            self.notify_watchers().await;
        }
    }

    async fn notify_watchers(&self) {
        let snapshot = {
            let mut guard = self.inner.lock().await;
            if guard.watchers.is_empty() {
                return;
            }
            std::mem::take(&mut guard.watchers)
        };

        for (viewer, tx) in snapshot {
            let rendering = {
                let guard = self.inner.lock().await;
                guard.render(&viewer)
            };
            let _ = tx.send(rendering);
        }
    }

    /// Test-only: returns a receiver that resolves the instant some flip
    /// actually enqueues itself as a rule-1-D waiter on `pos`. Lets tests
    /// drive contention deterministically instead of sleeping a fixed
    /// duration and hoping the other task got scheduled in time.
    #[cfg(test)]
    pub(crate) async fn wait_for_contention(&self, pos: Position) -> oneshot::Receiver<()> {
        let mut guard = self.inner.lock().await;
        let (tx, rx) = oneshot::channel();
        guard.wait_probes.entry(pos).or_default().push(tx);
        rx
    }

    /// Test-only: returns a receiver that resolves the instant the next
    /// `watch` call registers itself in the watcher registry.
    #[cfg(test)]
    pub(crate) async fn wait_for_watcher_registration(&self) -> oneshot::Receiver<()> {
        let mut guard = self.inner.lock().await;
        let (tx, rx) = oneshot::channel();
        guard.watcher_probes.push(tx);
        rx
    }
}
