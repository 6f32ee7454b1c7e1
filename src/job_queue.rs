//! Bounded job queue: a single-consumer FIFO worker fed by a bounded channel.
//! `submit` is synchronous and non-suspending — a full queue is rejected immediately with
//! [`Error::QueueFull`] rather than applying backpressure to the caller. Each accepted job carries
//! its own completion channel so an arbitrary number of callers can await independently.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::errors::Error;
use crate::metrics;
use crate::regen_engine::{Caller, Entrypoint, RegenEngine, RegenError};
use crate::regen_types::RegenTypes;
use crate::types::{BlockSummary, Checkpoint, Hash256, Slot};

/// The work a facade call dispatches to the queue once its fast path has missed.
pub enum RegenRequest {
    GetPreState { block: BlockSummary, caller: Caller },
    GetCheckpointState { checkpoint: Checkpoint, caller: Caller },
    GetBlockSlotState { block_root: Hash256, slot: Slot, caller: Caller },
    GetState { state_root: Hash256, caller: Caller },
}

impl RegenRequest {
    pub fn caller(&self) -> Caller {
        match self {
            RegenRequest::GetPreState { caller, .. }
            | RegenRequest::GetCheckpointState { caller, .. }
            | RegenRequest::GetBlockSlotState { caller, .. }
            | RegenRequest::GetState { caller, .. } => *caller,
        }
    }

    pub fn entrypoint(&self) -> Entrypoint {
        match self {
            RegenRequest::GetPreState { .. } => Entrypoint::GetPreState,
            RegenRequest::GetCheckpointState { .. } => Entrypoint::GetCheckpointState,
            RegenRequest::GetBlockSlotState { .. } => Entrypoint::GetBlockSlotState,
            RegenRequest::GetState { .. } => Entrypoint::GetState,
        }
    }
}

struct Job<T: RegenTypes> {
    request: RegenRequest,
    respond_to: oneshot::Sender<Result<Arc<T::State>, RegenError<T>>>,
}

/// A handle to the running worker. Cloning shares the same channel and worker task.
pub struct JobQueue<T: RegenTypes> {
    sender: mpsc::Sender<Job<T>>,
    cancel: CancellationToken,
    queue_len: Arc<AtomicUsize>,
}

impl<T: RegenTypes> Clone for JobQueue<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            cancel: self.cancel.clone(),
            queue_len: self.queue_len.clone(),
        }
    }
}

impl<T: RegenTypes> JobQueue<T> {
    /// Spawns the worker task and returns a handle to submit work to it.
    pub fn spawn(engine: Arc<RegenEngine<T>>, max_queue: usize) -> Self {
        let (sender, receiver) = mpsc::channel(max_queue);
        let cancel = CancellationToken::new();
        let queue_len = Arc::new(AtomicUsize::new(0));

        tokio::spawn(Self::run(engine, receiver, cancel.clone(), queue_len.clone()));

        Self { sender, cancel, queue_len }
    }

    /// Non-suspending: enqueues `request` or fails immediately with `QueueFull`/`Cancelled`.
    pub fn submit(
        &self,
        request: RegenRequest,
    ) -> Result<oneshot::Receiver<Result<Arc<T::State>, RegenError<T>>>, RegenError<T>> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let caller = request.caller();
        let entrypoint = request.entrypoint();
        let (respond_to, response) = oneshot::channel();
        let job = Job { request, respond_to };

        match self.sender.try_send(job) {
            Ok(()) => {
                self.queue_len.fetch_add(1, Ordering::SeqCst);
                metrics::set_gauge(&metrics::REGEN_QUEUE_LEN, self.queue_len.load(Ordering::SeqCst) as i64);
                metrics::inc_counter_vec(
                    &metrics::REGEN_FN_REQUESTS_TOTAL,
                    &[caller.0, entrypoint_label(entrypoint)],
                );
                Ok(response)
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(Error::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::Cancelled),
        }
    }

    /// Convenience wrapper: submits and suspends until the job completes or the queue is torn
    /// down while it's in flight.
    pub async fn submit_and_wait(
        &self,
        request: RegenRequest,
    ) -> Result<Arc<T::State>, RegenError<T>> {
        let response = self.submit(request)?;
        response.await.unwrap_or(Err(Error::Cancelled))
    }

    /// Raises the cancellation signal: no further submissions are accepted, the job currently
    /// executing (if any) is abandoned with `Cancelled`, and every job still sitting in the
    /// channel is drained and rejected the same way.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn len(&self) -> usize {
        self.queue_len.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn run(
        engine: Arc<RegenEngine<T>>,
        mut receiver: mpsc::Receiver<Job<T>>,
        cancel: CancellationToken,
        queue_len: Arc<AtomicUsize>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    while let Ok(job) = receiver.try_recv() {
                        queue_len.fetch_sub(1, Ordering::SeqCst);
                        let _ = job.respond_to.send(Err(Error::Cancelled));
                    }
                    metrics::set_gauge(&metrics::REGEN_QUEUE_LEN, 0);
                    break;
                }
                maybe_job = receiver.recv() => {
                    let Some(job) = maybe_job else { break };
                    queue_len.fetch_sub(1, Ordering::SeqCst);
                    metrics::set_gauge(&metrics::REGEN_QUEUE_LEN, queue_len.load(Ordering::SeqCst) as i64);

                    let caller = job.request.caller();
                    let entrypoint = job.request.entrypoint();
                    let labels = [caller.0, entrypoint_label(entrypoint)];

                    let timer = metrics::start_timer(&metrics::REGEN_FN_DURATION_SECONDS, &labels);
                    // Cancellation can interrupt a job that is already executing, not just ones
                    // still sitting in the channel.
                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(Error::Cancelled),
                        result = engine.execute(&job.request) => result,
                    };
                    if let Some(timer) = timer {
                        timer.observe_duration();
                    }
                    if let Err(err) = &result {
                        metrics::inc_counter_vec(&metrics::REGEN_FN_TOTAL_ERRORS, &[caller.0, err.label()]);
                        tracing::warn!(entrypoint = ?entrypoint, error = %err, "regen job failed");
                    }

                    let _ = job.respond_to.send(result);
                }
            }
        }
    }
}

fn entrypoint_label(entrypoint: Entrypoint) -> &'static str {
    <&'static str>::from(&entrypoint)
}

impl<T: RegenTypes> RegenEngine<T> {
    /// Dispatches a dequeued [`RegenRequest`] to the matching regeneration path.
    pub async fn execute(&self, request: &RegenRequest) -> Result<Arc<T::State>, RegenError<T>> {
        match request {
            RegenRequest::GetPreState { block, .. } => self.regen_pre_state(block).await,
            RegenRequest::GetCheckpointState { checkpoint, .. } => {
                self.regen_checkpoint_state(*checkpoint).await
            }
            RegenRequest::GetBlockSlotState { block_root, slot, .. } => {
                self.regen_block_slot_state(*block_root, *slot).await
            }
            RegenRequest::GetState { state_root, .. } => self.regen_state(*state_root).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint_cache::CheckpointStateCache;
    use crate::state_cache::StateCache;
    use crate::test_utils::{InMemoryForkChoice, MockPersistentReader, MockState, MockStateTransition, TestTypes};
    use crate::types::{Checkpoint, Epoch, MainnetEthSpec};
    use std::num::NonZeroUsize;

    fn state_cache() -> Arc<StateCache<MainnetEthSpec, MockState>> {
        Arc::new(StateCache::new(NonZeroUsize::new(8).unwrap()))
    }

    fn engine_with_cache(
        fc: InMemoryForkChoice,
        transition: MockStateTransition,
        state_cache: Arc<StateCache<MainnetEthSpec, MockState>>,
    ) -> Arc<RegenEngine<TestTypes>> {
        Arc::new(RegenEngine::new(
            Arc::new(fc),
            Arc::new(MockPersistentReader::new()),
            Arc::new(transition),
            state_cache,
            Arc::new(CheckpointStateCache::new(NonZeroUsize::new(8).unwrap())),
        ))
    }

    #[tokio::test]
    async fn queue_full_rejects_immediately() {
        let fc = InMemoryForkChoice::new(Checkpoint { epoch: Epoch::new(0), root: Hash256::repeat_byte(0) });
        let engine = engine_with_cache(fc, MockStateTransition::new(), state_cache());
        let queue = JobQueue::spawn(engine, 1);

        // Capacity is 1 and the worker never got a turn to run (no `.await` happened yet), so the
        // channel is already full after the first submit.
        let first = queue.submit(RegenRequest::GetCheckpointState {
            checkpoint: Checkpoint { epoch: Epoch::new(1), root: Hash256::repeat_byte(1) },
            caller: Caller("test"),
        });
        assert!(first.is_ok());

        let overflow = queue.submit(RegenRequest::GetCheckpointState {
            checkpoint: Checkpoint { epoch: Epoch::new(1), root: Hash256::repeat_byte(2) },
            caller: Caller("test"),
        });
        assert!(matches!(overflow, Err(Error::QueueFull)));
    }

    #[tokio::test]
    async fn cancellation_drains_pending_and_in_flight_jobs() {
        let genesis = Hash256::repeat_byte(0);
        let fc = InMemoryForkChoice::new(Checkpoint { epoch: Epoch::new(0), root: genesis });
        let block = fc.add_block(genesis, Slot::new(5), genesis);

        let cache = state_cache();
        // Seed the genesis state: regenerating it from scratch is out of scope (it has no
        // parent), so the host is expected to have loaded it once at startup.
        cache.put(genesis, Arc::new(MockState::at_slot_with_root(0, genesis)));

        let gate = Arc::new(tokio::sync::Notify::new());
        let engine = engine_with_cache(fc, MockStateTransition::gated(gate.clone()), cache);
        let queue = JobQueue::spawn(engine, 8);

        // This job reaches `replay_block`, which blocks on the ungated `gate` forever.
        let blocked = queue
            .submit(RegenRequest::GetBlockSlotState {
                block_root: block,
                slot: Slot::new(5),
                caller: Caller("test"),
            })
            .unwrap();
        let pending = queue
            .submit(RegenRequest::GetCheckpointState {
                checkpoint: Checkpoint { epoch: Epoch::new(1), root: Hash256::repeat_byte(9) },
                caller: Caller("test"),
            })
            .unwrap();

        // Give the worker a chance to pick up the first job and start waiting on the gate.
        tokio::task::yield_now().await;
        queue.cancel();

        let pending_result = pending.await.unwrap();
        assert!(matches!(pending_result, Err(Error::Cancelled)));

        // The job the worker was already executing is abandoned too, not just the queued one.
        let blocked_result = blocked.await.unwrap();
        assert!(matches!(blocked_result, Err(Error::Cancelled)));
        let _ = gate; // never notified: cancellation must win without it.
    }
}
