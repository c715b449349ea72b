//! Background execution of automated reply pipelines
//!
//! At most one pipeline runs per conversation; later ones wait their turn
//! so replies to consecutive messages never interleave. Different
//! conversations proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use parley_shared::{ConversationSession, Message};

use super::automated::{AutomatedResponseEngine, DispatchedReply};

/// Per-conversation queue. Lives until its last pipeline finishes, so the
/// turn mutex is shared by everything scheduled in the meantime, cancelled
/// or not.
struct Pipeline {
    turn: Arc<AsyncMutex<()>>,
    cancel: CancellationToken,
    /// Bumped on every cancel; pipelines remember the epoch they joined
    epoch: u64,
    /// Pipelines queued or running
    pending: usize,
    /// Of those, the ones still under the current token
    live: usize,
}

type PipelineTable = Arc<Mutex<HashMap<String, Pipeline>>>;

pub struct AutoReplyScheduler {
    engine: Arc<AutomatedResponseEngine>,
    pipelines: PipelineTable,
    shutdown: CancellationToken,
}

impl AutoReplyScheduler {
    pub fn new(engine: Arc<AutomatedResponseEngine>) -> Self {
        Self {
            engine,
            pipelines: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Queue the automated replies for a freshly persisted customer message.
    ///
    /// Returns immediately; the caller never waits on rule delays.
    pub fn schedule(&self, session: ConversationSession, trigger: Message) -> JoinHandle<Vec<DispatchedReply>> {
        let customer_id = session.customer_id.clone();

        let (epoch, turn, cancel) = {
            let mut table = self.pipelines.lock().unwrap_or_else(PoisonError::into_inner);
            let pipeline = table.entry(customer_id.clone()).or_insert_with(|| Pipeline {
                turn: Arc::new(AsyncMutex::new(())),
                cancel: self.shutdown.child_token(),
                epoch: 0,
                pending: 0,
                live: 0,
            });
            pipeline.pending += 1;
            pipeline.live += 1;
            (pipeline.epoch, Arc::clone(&pipeline.turn), pipeline.cancel.clone())
        };

        let engine = Arc::clone(&self.engine);
        let pipelines = Arc::clone(&self.pipelines);

        tokio::spawn(async move {
            let _turn = turn.lock().await;

            let replies = if cancel.is_cancelled() {
                Vec::new()
            } else {
                engine.respond(&session, &trigger, &cancel).await
            };

            finish(&pipelines, &customer_id, epoch);
            replies
        })
    }

    /// Cancel queued and in-flight replies for one conversation. Pipelines
    /// scheduled afterwards still wait for the cancelled ones to let go of
    /// the conversation.
    ///
    /// Returns whether anything was pending.
    pub fn cancel(&self, customer_id: &str) -> bool {
        let mut table = self.pipelines.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(pipeline) = table.get_mut(customer_id) else {
            return false;
        };
        if pipeline.live == 0 {
            return false;
        }

        let cancelled = std::mem::replace(&mut pipeline.cancel, self.shutdown.child_token());
        cancelled.cancel();
        pipeline.epoch += 1;

        tracing::info!(
            customer_id = %customer_id,
            pending = pipeline.live,
            "Cancelled automated responses"
        );
        pipeline.live = 0;
        true
    }

    /// Number of pipelines queued or running for a conversation
    pub fn pending(&self, customer_id: &str) -> usize {
        self.pipelines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(customer_id)
            .map(|p| p.pending)
            .unwrap_or(0)
    }

    /// Cancel everything; called once the server stops accepting traffic
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let pipelines = self.pipelines.lock().unwrap_or_else(PoisonError::into_inner).len();
        tracing::info!(pipelines, "Automated response scheduler stopped");
    }
}

fn finish(pipelines: &Mutex<HashMap<String, Pipeline>>, customer_id: &str, epoch: u64) {
    let mut table = pipelines.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(pipeline) = table.get_mut(customer_id) {
        pipeline.pending = pipeline.pending.saturating_sub(1);
        if pipeline.epoch == epoch {
            pipeline.live = pipeline.live.saturating_sub(1);
        }
        if pipeline.pending == 0 {
            table.remove(customer_id);
        }
    }
}
