//! Live project updates over websockets.
//!
//! A connection to `/ws/project/{id}/` joins the project's broadcast group
//! and forwards every event published there. Clients may send `typing`
//! signals, which are relayed to the other connections in the group.

use crate::{
    auth::MaybeUser,
    errors::AppError,
    services::{
        notifier::{InboundMessage, Notifier, OutboundMessage, Subscription},
        tracker_service::TrackerService,
    },
};
use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    response::{IntoResponse, Response},
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use tracing::{debug, warn};
use uuid::Uuid;

/// `GET /ws/project/{project_id}/`
///
/// Only the owner and members may connect. Everyone else gets a 403 before
/// the handshake completes and never joins the group.
pub async fn project_socket(
    State(service): State<TrackerService>,
    Path(project_id): Path<i64>,
    MaybeUser(user): MaybeUser,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AppError> {
    let Some(user) = user else {
        return Err(AppError::forbidden("authentication required"));
    };
    if !service.can_access_project(user.id, project_id).await? {
        debug!(
            "refused socket for {} on project {}",
            user.username, project_id
        );
        return Err(AppError::forbidden("not a member of this project"));
    }
    let upgrade = upgrade
        .map_err(|rejection| AppError::new(rejection.status(), rejection.body_text()))?;

    let notifier = service.notifier.clone();
    Ok(upgrade
        .on_upgrade(move |socket| handle_socket(socket, notifier, project_id, user.username))
        .into_response())
}

async fn handle_socket(socket: WebSocket, notifier: Notifier, project_id: i64, username: String) {
    let subscription = notifier.join(project_id);
    debug!(
        "{} connected to {} ({} live)",
        username,
        Notifier::group_name(project_id),
        notifier.group_size(project_id)
    );
    let (sender, receiver) = socket.split();
    run_relay(sender, receiver, notifier, subscription, username).await;
}

/// Pump events between one client and its project group until either side
/// goes away, then leave the group.
pub(crate) async fn run_relay<S, R, E>(
    mut sender: S,
    mut receiver: R,
    notifier: Notifier,
    mut subscription: Subscription,
    username: String,
) where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let project_id = subscription.project_id;
    let connection_id = subscription.connection_id;

    loop {
        tokio::select! {
            event = subscription.next_message() => {
                let Some(event) = event else { break };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!("failed to serialize event for {}: {}", connection_id, err);
                        continue;
                    }
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }

            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        relay_inbound(&notifier, project_id, connection_id, &username, text.as_str());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!("socket {} errored: {}", connection_id, err);
                        break;
                    }
                }
            }
        }
    }

    notifier.leave(subscription);
    let _ = sender.send(Message::Close(None)).await;
}

fn relay_inbound(
    notifier: &Notifier,
    project_id: i64,
    connection_id: Uuid,
    username: &str,
    text: &str,
) {
    match serde_json::from_str::<InboundMessage>(text) {
        Ok(InboundMessage::Typing { bug_id, is_typing }) => {
            notifier.relay(
                project_id,
                connection_id,
                OutboundMessage::TypingIndicator {
                    user: username.to_string(),
                    bug_id,
                    is_typing,
                },
            );
        }
        Err(err) => debug!("discarding payload from {}: {}", connection_id, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    type Inbound = mpsc::UnboundedSender<Result<Message, axum::Error>>;
    type Outbound = mpsc::UnboundedReceiver<Message>;

    fn connect(
        notifier: &Notifier,
        project_id: i64,
        username: &str,
    ) -> (Inbound, Outbound, tokio::task::JoinHandle<()>) {
        let (out_tx, out_rx) = mpsc::unbounded::<Message>();
        let (in_tx, in_rx) = mpsc::unbounded::<Result<Message, axum::Error>>();
        let subscription = notifier.join(project_id);
        let task = tokio::spawn(run_relay(
            out_tx,
            in_rx,
            notifier.clone(),
            subscription,
            username.to_string(),
        ));
        (in_tx, out_rx, task)
    }

    fn text(value: serde_json::Value) -> Result<Message, axum::Error> {
        Ok(Message::Text(value.to_string().into()))
    }

    async fn next_event(out: &mut Outbound) -> OutboundMessage {
        let message = timeout(Duration::from_secs(1), out.next())
            .await
            .expect("event in time")
            .expect("socket open");
        match message {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn typing_reaches_others_but_not_the_sender() {
        let notifier = Notifier::new(16);
        let (alice_in, mut alice_out, _alice) = connect(&notifier, 1, "alice");
        let mut bob = notifier.join(1);

        alice_in
            .unbounded_send(text(json!({"type": "typing", "bug_id": 7, "is_typing": true})))
            .unwrap();

        let seen = timeout(Duration::from_secs(1), bob.next_message())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            seen,
            OutboundMessage::TypingIndicator {
                user: "alice".into(),
                bug_id: 7,
                is_typing: true
            }
        );

        // The typing relay was sent first; alice must skip it.
        notifier.publish(1, OutboundMessage::ActivityUpdate { data: json!({"id": 1}) });
        assert_eq!(
            next_event(&mut alice_out).await,
            OutboundMessage::ActivityUpdate { data: json!({"id": 1}) }
        );
    }

    #[tokio::test]
    async fn malformed_payloads_are_dropped() {
        let notifier = Notifier::new(16);
        let (alice_in, _alice_out, _alice) = connect(&notifier, 1, "alice");
        let mut bob = notifier.join(1);

        alice_in
            .unbounded_send(Ok(Message::Text("not json".into())))
            .unwrap();
        alice_in.unbounded_send(text(json!({"type": "shout"}))).unwrap();
        alice_in
            .unbounded_send(text(json!({"type": "typing", "bug_id": 3})))
            .unwrap();

        let seen = timeout(Duration::from_secs(1), bob.next_message())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            seen,
            OutboundMessage::TypingIndicator {
                user: "alice".into(),
                bug_id: 3,
                is_typing: false
            }
        );
        assert!(
            timeout(Duration::from_millis(50), bob.next_message())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn forwards_events_and_leaves_on_close() {
        let notifier = Notifier::new(16);
        let (alice_in, mut alice_out, alice) = connect(&notifier, 4, "alice");
        let bob = notifier.join(4);
        assert_eq!(notifier.group_size(4), 2);

        notifier.publish(
            4,
            OutboundMessage::CommentAdded {
                bug_id: 9,
                data: json!({"message": "hi"}),
            },
        );
        assert!(matches!(
            next_event(&mut alice_out).await,
            OutboundMessage::CommentAdded { bug_id: 9, .. }
        ));

        drop(alice_in);
        alice.await.unwrap();
        assert_eq!(notifier.group_size(4), 1);
        assert!(matches!(alice_out.next().await, Some(Message::Close(None))));

        notifier.leave(bob);
        assert_eq!(notifier.group_size(4), 0);
    }
}
