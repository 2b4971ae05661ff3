//! `eth_subscribe("newPendingTransactions")` over a WebSocket.
use super::RpcErrorObject;
use crate::{
    client::{PendingTxStream, TxHash},
    error::{ClientError, ClientResult},
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
};
use tracing::debug;

const SUBSCRIBE_ID: u64 = 1;
const UNSUBSCRIBE_ID: u64 = 2;

/// Reply to the subscribe call.
#[derive(Deserialize)]
struct SubscribeReply {
    id: Option<u64>,
    result: Option<String>,
    error: Option<RpcErrorObject>,
}

/// Server push for an active subscription.
#[derive(Deserialize)]
struct Notification {
    method: Option<String>,
    params: Option<NotificationParams>,
}

#[derive(Deserialize)]
struct NotificationParams {
    subscription: String,
    result: Value,
}

/// Extract the hash from a notification for `sub_id`. Nodes may push either
/// the bare hash or a full transaction object.
fn parse_notification(text: &str, sub_id: &str) -> Option<TxHash> {
    let note: Notification = serde_json::from_str(text).ok()?;
    if note.method.as_deref() != Some("eth_subscription") {
        return None;
    }
    let params = note.params?;
    if params.subscription != sub_id {
        return None;
    }
    let hash = match &params.result {
        Value::String(s) => s.as_str(),
        Value::Object(obj) => obj.get("hash")?.as_str()?,
        _ => return None,
    };
    let bytes = hex::decode(hash.trim_start_matches("0x")).ok()?;
    (bytes.len() == 32).then(|| TxHash::from_slice(&bytes))
}

fn unsubscribe_request(sub_id: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": UNSUBSCRIBE_ID,
        "method": "eth_unsubscribe",
        "params": [sub_id],
    })
    .to_string()
}

/// Connect, subscribe, and wait for the subscription id. A background task
/// owns the socket; dropping the returned stream makes it unsubscribe and
/// close the socket.
pub(super) async fn subscribe_pending(url: &str) -> ClientResult<PendingTxStream> {
    let (mut socket, _) = connect_async(url).await.map_err(ClientError::retryable)?;

    let req = json!({
        "jsonrpc": "2.0",
        "id": SUBSCRIBE_ID,
        "method": "eth_subscribe",
        "params": ["newPendingTransactions"],
    });
    socket
        .send(Message::Text(req.to_string()))
        .await
        .map_err(ClientError::retryable)?;

    let sub_id = loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => {
                let Ok(reply) = serde_json::from_str::<SubscribeReply>(&text) else {
                    continue;
                };
                if reply.id != Some(SUBSCRIBE_ID) {
                    continue;
                }
                if let Some(err) = reply.error {
                    return Err(err.into());
                }
                break reply
                    .result
                    .ok_or_else(|| ClientError::Retryable("subscribe: null result".into()))?;
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(ClientError::Retryable(
                    "socket closed before subscription".into(),
                ))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(ClientError::retryable(e)),
        }
    };
    debug!(subscription = %sub_id, "pending transaction subscription open");

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(forward(socket, sub_id, tx));
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    Ok(Box::pin(stream))
}

/// Push notification hashes into `tx` until the socket ends or the receiver
/// goes away; in the latter case unsubscribe first.
async fn forward<S>(mut socket: S, sub_id: String, tx: mpsc::UnboundedSender<ClientResult<TxHash>>)
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    loop {
        tokio::select! {
            _ = tx.closed() => {
                if let Err(e) = socket.send(Message::Text(unsubscribe_request(&sub_id))).await {
                    debug!(subscription = %sub_id, error = %e, "unsubscribe failed");
                }
                let _ = socket.close().await;
                debug!(subscription = %sub_id, "pending transaction subscription closed");
                return;
            }
            msg = socket.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(hash) = parse_notification(&text, &sub_id) {
                        // a closed receiver is handled on the next turn
                        let _ = tx.send(Ok(hash));
                    }
                }
                Some(Ok(Message::Close(_))) | None => return,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = tx.send(Err(ClientError::retryable(e)));
                    return;
                }
            },
        }
    }
}
