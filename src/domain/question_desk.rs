//! Correlation of TEF questions with frontend replies.
//!
//! Each station has one pending-question slot. Asking publishes a
//! `TEF_ASK_QUESTION` event, parks a one-shot reply channel in the slot and
//! waits for the reply with no timeout. A second question from the same
//! station waits for its turn, so its event is published only after the first
//! reply has been consumed. Stations do not wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as TurnLock, oneshot};
use uuid::Uuid;

use super::{EventStream, PosEvent, StationId};
use crate::error::HubError;

#[derive(Debug)]
struct PendingQuestion {
    id: Uuid,
    reply: oneshot::Sender<serde_json::Value>,
}

/// Per-station pending question slots.
#[derive(Debug, Default)]
pub struct QuestionDesk {
    turns: Mutex<HashMap<StationId, Arc<TurnLock<()>>>>,
    pending: Mutex<HashMap<StationId, PendingQuestion>>,
}

impl QuestionDesk {
    /// Creates a desk with no pending questions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `question` to `station` and waits for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Internal`] if the slot was torn down without a
    /// reply.
    pub async fn ask(
        &self,
        events: &EventStream,
        station: &StationId,
        question: serde_json::Value,
    ) -> Result<serde_json::Value, HubError> {
        let turn = self.turn_for(station);
        let _turn = turn.lock().await;

        let (reply, answer) = oneshot::channel();
        let id = Uuid::new_v4();
        self.pending()
            .insert(station.clone(), PendingQuestion { id, reply });
        let _slot = SlotGuard {
            desk: self,
            station,
            id,
        };

        events
            .push_to_station(station, &PosEvent::TefAskQuestion { data: question })
            .await;

        tracing::info!(%station, question_id = %id, "waiting tef reply");
        let value = answer
            .await
            .map_err(|_| HubError::Internal(format!("question {id} abandoned")))?;
        tracing::info!(%station, question_id = %id, reply = %value, "got tef reply");
        Ok(value)
    }

    /// Delivers `value` to the question pending for `station`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NoPendingQuestion`] when the station has no
    /// outstanding question. Nothing is queued in that case.
    pub fn submit_reply(
        &self,
        station: &StationId,
        value: serde_json::Value,
    ) -> Result<(), HubError> {
        let pending = self
            .pending()
            .remove(station)
            .ok_or_else(|| HubError::NoPendingQuestion(station.clone()))?;
        pending
            .reply
            .send(value)
            .map_err(|_| HubError::NoPendingQuestion(station.clone()))
    }

    /// Returns `true` if `station` is waiting for a reply.
    #[must_use]
    pub fn is_waiting(&self, station: &StationId) -> bool {
        self.pending().contains_key(station)
    }

    fn turn_for(&self, station: &StationId) -> Arc<TurnLock<()>> {
        let mut turns = self.turns.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(turns.entry(station.clone()).or_default())
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<StationId, PendingQuestion>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the slot when the asking task finishes or is cancelled.
struct SlotGuard<'a> {
    desk: &'a QuestionDesk,
    station: &'a StationId,
    id: Uuid,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut pending = self.desk.pending();
        if pending.get(self.station).is_some_and(|slot| slot.id == self.id) {
            pending.remove(self.station);
        }
    }
}
