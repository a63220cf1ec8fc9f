//! Event classification and dispatch
//!
//! The event-loop driver reduces raw engine events to `EngineSignal`s with a
//! pure classification function, then surfaces the observable subset as
//! `SessionEvent`s on a channel consumed by a dedicated dispatch task.

use bytes::Bytes;
use rumqttc::{ConnectReturnCode, Event, Outgoing, Packet, SubscribeReasonCode};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::session::token::ConnectAck;

/// Observable session events, delivered asynchronously by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The handshake completed and the session is live
    ConnectComplete {
        session_present: bool,
        server_uri: String,
    },
    /// A message arrived on a subscribed topic
    MessageArrived { topic: String, payload: Bytes },
    /// The broker acknowledged delivery of a published message
    DeliveryComplete { message_id: u16 },
    /// The connection dropped without a local disconnect request
    Disconnected { reason: String },
    /// A failure inside the session machinery, reported rather than thrown
    Error { description: String },
}

/// Routing decision for one raw engine event
#[derive(Debug, Clone)]
pub(crate) enum EngineSignal {
    /// Broker accepted the handshake
    HandshakeAcknowledged(ConnectAck),
    /// Broker refused the handshake
    HandshakeRejected { reason: String },
    /// Message received on a subscribed topic
    MessageReceived { topic: String, payload: Bytes },
    /// Delivery acknowledgment for a published message
    DeliveryAcknowledged { packet_id: u16 },
    /// Subscription confirmed; failure codes surface in the outcome
    SubscriptionConfirmed {
        packet_id: u16,
        outcome: Result<(), String>,
    },
    /// The engine assigned a packet id to an outgoing publish
    PublishSent { packet_id: u16 },
    /// The engine assigned a packet id to an outgoing subscribe
    SubscribeSent { packet_id: u16 },
    /// The disconnect request reached the wire
    DisconnectSent,
    /// Keep-alive traffic and other engine chatter
    Infrastructure,
}

/// Classify a raw engine event (pure routing decision)
pub(crate) fn classify_event(event: &Event) -> EngineSignal {
    match event {
        Event::Incoming(packet) => match packet {
            Packet::ConnAck(ack) if ack.code == ConnectReturnCode::Success => {
                EngineSignal::HandshakeAcknowledged(ConnectAck {
                    session_present: ack.session_present,
                })
            }
            Packet::ConnAck(ack) => EngineSignal::HandshakeRejected {
                reason: format!("{:?}", ack.code),
            },
            Packet::Publish(publish) => EngineSignal::MessageReceived {
                topic: publish.topic.clone(),
                payload: publish.payload.clone(),
            },
            Packet::PubAck(puback) => EngineSignal::DeliveryAcknowledged {
                packet_id: puback.pkid,
            },
            Packet::SubAck(suback) => EngineSignal::SubscriptionConfirmed {
                packet_id: suback.pkid,
                outcome: validate_subscribe_codes(&suback.return_codes),
            },
            _ => EngineSignal::Infrastructure,
        },
        Event::Outgoing(outgoing) => match outgoing {
            Outgoing::Publish(pkid) => EngineSignal::PublishSent { packet_id: *pkid },
            Outgoing::Subscribe(pkid) => EngineSignal::SubscribeSent { packet_id: *pkid },
            Outgoing::Disconnect => EngineSignal::DisconnectSent,
            _ => EngineSignal::Infrastructure,
        },
    }
}

/// Validate subscription return codes (pure function)
///
/// A subscription is only as good as its worst filter: any failure code
/// rejects the whole request.
pub(crate) fn validate_subscribe_codes(codes: &[SubscribeReasonCode]) -> Result<(), String> {
    if codes
        .iter()
        .any(|code| matches!(code, SubscribeReasonCode::Failure))
    {
        Err(format!("broker returned failure codes: {codes:?}"))
    } else {
        Ok(())
    }
}

/// Dedicated task that renders session events as structured log lines
///
/// The producing side only ever performs an unbounded channel send, so event
/// delivery never blocks the engine's internal processing. Rendering cannot
/// fail; payloads that are not valid UTF-8 are logged lossily.
pub struct EventDispatcher {
    task: JoinHandle<()>,
}

impl EventDispatcher {
    /// Spawn the dispatch task consuming `events`
    pub fn spawn(mut events: mpsc::UnboundedReceiver<SessionEvent>) -> Self {
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                render_event(&event);
            }
            debug!("Event channel closed, dispatcher exiting");
        });
        Self { task }
    }

    /// Wait for the dispatcher to drain; returns once every sender is gone
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// Render one event to the log
fn render_event(event: &SessionEvent) {
    match event {
        SessionEvent::ConnectComplete {
            session_present,
            server_uri,
        } => {
            info!(
                server_uri = %server_uri,
                session_present = %session_present,
                "Connected to broker"
            );
        }
        SessionEvent::MessageArrived { topic, payload } => {
            info!(
                topic = %topic,
                payload = %String::from_utf8_lossy(payload),
                "Message arrived"
            );
        }
        SessionEvent::DeliveryComplete { message_id } => {
            info!(message_id = %message_id, "Delivery complete");
        }
        SessionEvent::Disconnected { reason } => {
            warn!(reason = %reason, "Connection to broker lost");
        }
        SessionEvent::Error { description } => {
            error!(description = %description, "Session error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, PubAck, Publish, QoS, SubAck};

    #[test]
    fn test_classify_successful_connack() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: true,
            code: ConnectReturnCode::Success,
        }));

        match classify_event(&event) {
            EngineSignal::HandshakeAcknowledged(ack) => assert!(ack.session_present),
            other => panic!("Expected HandshakeAcknowledged, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_refused_connack() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::BadUserNamePassword,
        }));

        match classify_event(&event) {
            EngineSignal::HandshakeRejected { reason } => {
                assert!(reason.contains("BadUserNamePassword"))
            }
            other => panic!("Expected HandshakeRejected, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_inbound_publish() {
        let event = Event::Incoming(Packet::Publish(Publish {
            dup: false,
            qos: QoS::AtLeastOnce,
            retain: false,
            topic: "t/1".to_string(),
            pkid: 12,
            payload: Bytes::from("hi #1"),
        }));

        match classify_event(&event) {
            EngineSignal::MessageReceived { topic, payload } => {
                assert_eq!(topic, "t/1");
                assert_eq!(payload, Bytes::from("hi #1"));
            }
            other => panic!("Expected MessageReceived, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_delivery_ack() {
        let event = Event::Incoming(Packet::PubAck(PubAck { pkid: 7 }));
        assert!(matches!(
            classify_event(&event),
            EngineSignal::DeliveryAcknowledged { packet_id: 7 }
        ));
    }

    #[test]
    fn test_classify_subscription_confirmation() {
        let event = Event::Incoming(Packet::SubAck(SubAck {
            pkid: 3,
            return_codes: vec![SubscribeReasonCode::Success(QoS::AtLeastOnce)],
        }));

        match classify_event(&event) {
            EngineSignal::SubscriptionConfirmed { packet_id, outcome } => {
                assert_eq!(packet_id, 3);
                assert!(outcome.is_ok());
            }
            other => panic!("Expected SubscriptionConfirmed, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_rejected_subscription() {
        let event = Event::Incoming(Packet::SubAck(SubAck {
            pkid: 4,
            return_codes: vec![SubscribeReasonCode::Failure],
        }));

        match classify_event(&event) {
            EngineSignal::SubscriptionConfirmed { outcome, .. } => {
                assert!(outcome.is_err());
            }
            other => panic!("Expected SubscriptionConfirmed, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_outgoing_events() {
        assert!(matches!(
            classify_event(&Event::Outgoing(Outgoing::Publish(9))),
            EngineSignal::PublishSent { packet_id: 9 }
        ));
        assert!(matches!(
            classify_event(&Event::Outgoing(Outgoing::Subscribe(2))),
            EngineSignal::SubscribeSent { packet_id: 2 }
        ));
        assert!(matches!(
            classify_event(&Event::Outgoing(Outgoing::Disconnect)),
            EngineSignal::DisconnectSent
        ));
    }

    #[test]
    fn test_keep_alive_traffic_is_infrastructure() {
        assert!(matches!(
            classify_event(&Event::Incoming(Packet::PingResp)),
            EngineSignal::Infrastructure
        ));
        assert!(matches!(
            classify_event(&Event::Outgoing(Outgoing::PingReq)),
            EngineSignal::Infrastructure
        ));
    }

    #[test]
    fn test_validate_subscribe_codes_mixed_failure() {
        let codes = vec![
            SubscribeReasonCode::Success(QoS::AtLeastOnce),
            SubscribeReasonCode::Failure,
        ];
        assert!(validate_subscribe_codes(&codes).is_err());
        assert!(validate_subscribe_codes(&[]).is_ok());
    }

    #[tokio::test]
    async fn test_dispatcher_drains_and_exits_when_channel_closes() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let dispatcher = EventDispatcher::spawn(receiver);

        sender
            .send(SessionEvent::DeliveryComplete { message_id: 1 })
            .expect("dispatcher should be listening");
        // Invalid UTF-8 payloads must render lossily, never panic
        sender
            .send(SessionEvent::MessageArrived {
                topic: "t/1".to_string(),
                payload: Bytes::from(vec![0xff, 0xfe, 0xfd]),
            })
            .expect("dispatcher should be listening");

        drop(sender);
        dispatcher.join().await;
    }
}
