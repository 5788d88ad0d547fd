//! Opening a station's event stream.

use crate::domain::{EventSource, EventStream, PosEvent, StationId};
use crate::service::PendingTransactionCheck;

/// Warning shown when the previous TEF transaction was left unfinished.
pub const PENDING_TRANSACTION_WARNING: &str =
    "Última transação TEF não foi efetuada. Favor reter o Cupom.";

/// Subscribes `station` and returns its event source.
///
/// When the last TEF transaction was cancelled, the stream starts with a
/// `TEF_WARNING_MESSAGE` followed by `CLEAR_SALE`, ahead of any other event.
pub async fn connect_station(
    events: &EventStream,
    pending: &dyn PendingTransactionCheck,
    station: &StationId,
) -> EventSource {
    let preamble = if pending.has_cancelled_transaction().await {
        tracing::warn!(%station, "last tef transaction was not completed");
        vec![
            PosEvent::TefWarningMessage {
                message: PENDING_TRANSACTION_WARNING.to_string(),
            },
            PosEvent::ClearSale,
        ]
    } else {
        Vec::new()
    };
    events.subscribe_with(station, &preamble)
}
