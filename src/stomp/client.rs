use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::core::{
    client::ConnectionDetails,
    errors::{ErrorListener, FeedError, FeedErrorType, Result},
    subscription::{FeedSubscription, SubscriptionState},
};
use crate::stomp::{
    config::FeedClientConfig,
    connector::{TransportEvent, TransportHandle},
    frame::{headers, StompCommand, StompFrame},
};

const ACCEPTED_VERSIONS: &str = "1.2,1.1,1.0";
const HEARTBEAT_EOL: &str = "\n";

/// A live subscription: the recorded binding plus the stream of MESSAGE
/// frames routed to it.
pub struct StompSubscription {
    pub subscription: FeedSubscription,
    pub messages: mpsc::UnboundedReceiver<StompFrame>,
}

#[derive(Default)]
struct SessionState {
    pending_connect: Option<oneshot::Sender<Result<ConnectionDetails>>>,
    pending_receipts: HashMap<String, oneshot::Sender<()>>,
    subscriptions: HashMap<String, mpsc::UnboundedSender<StompFrame>>,
    details: Option<ConnectionDetails>,
    /// CONNECTED was received
    connected: bool,
    /// The client asked to disconnect
    closing: bool,
    /// The transport is gone
    closed: bool,
}

/// STOMP session running over one duplex transport.
///
/// A reader task owns the incoming side of the transport and routes frames:
/// CONNECTED resolves `connect`, MESSAGE goes to its subscription, RECEIPT
/// resolves `disconnect`, ERROR fails the handshake or is published to the
/// error listeners.
pub struct StompClient {
    config: FeedClientConfig,
    outgoing: Mutex<Option<mpsc::Sender<String>>>,
    session: Arc<Mutex<SessionState>>,
    error_listeners: Arc<Mutex<HashMap<Uuid, ErrorListener>>>,
    next_subscription_id: AtomicU64,
    next_receipt_id: AtomicU64,
    reader: JoinHandle<()>,
    heartbeat: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl StompClient {
    /// Wraps an open transport in a STOMP session and starts reading from it
    pub fn over(transport: TransportHandle, config: &FeedClientConfig) -> Self {
        let TransportHandle { outgoing, incoming } = transport;
        let session = Arc::new(Mutex::new(SessionState::default()));
        let error_listeners: Arc<Mutex<HashMap<Uuid, ErrorListener>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let reader = tokio::spawn(Self::read_loop(
            incoming,
            session.clone(),
            error_listeners.clone(),
        ));

        Self {
            config: config.clone(),
            outgoing: Mutex::new(Some(outgoing)),
            session,
            error_listeners,
            next_subscription_id: AtomicU64::new(0),
            next_receipt_id: AtomicU64::new(0),
            reader,
            heartbeat: std::sync::Mutex::new(None),
        }
    }

    /// Performs the CONNECT handshake.
    ///
    /// `extra_headers` are appended to the protocol headers the client always sends.
    pub async fn connect(&self, extra_headers: Vec<(String, String)>) -> Result<ConnectionDetails> {
        let (tx, rx) = oneshot::channel();
        {
            let mut session = self.session.lock().await;
            if session.closed {
                return Err(FeedError::new(
                    FeedErrorType::ConnectFailure,
                    "Transport closed before CONNECT",
                ));
            }
            if session.connected || session.pending_connect.is_some() {
                return Err(FeedError::bad_action("STOMP session is already connecting"));
            }
            session.pending_connect = Some(tx);
        }

        let mut frame = StompFrame::new(StompCommand::Connect)
            .header(headers::ACCEPT_VERSION, ACCEPTED_VERSIONS)
            .header(
                headers::HEART_BEAT,
                format!("{},0", self.config.heartbeat.as_millis()),
            );
        if let Some(host) = &self.config.host {
            frame = frame.header(headers::HOST, host.clone());
        }
        for (name, value) in extra_headers {
            frame = frame.header(name, value);
        }

        debug!("Sending CONNECT");
        if let Err(e) = self.send_frame(frame).await {
            self.session.lock().await.pending_connect = None;
            return Err(e);
        }

        let outcome = match self.config.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.session.lock().await.pending_connect = None;
                    return Err(FeedError::new(
                        FeedErrorType::Timeout,
                        format!("No CONNECTED frame within {:?}", limit),
                    ));
                }
            },
            None => rx.await,
        };

        let details = outcome.map_err(|_| {
            FeedError::new(
                FeedErrorType::ConnectFailure,
                "Session ended before CONNECTED",
            )
        })??;

        self.start_heartbeat(&details).await;
        Ok(details)
    }

    /// Subscribes to `destination` and returns the stream of its messages
    pub async fn subscribe(&self, destination: &str) -> Result<StompSubscription> {
        let id = format!(
            "sub-{}",
            self.next_subscription_id.fetch_add(1, Ordering::SeqCst)
        );
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut session = self.session.lock().await;
            if session.closed {
                return Err(FeedError::new(
                    FeedErrorType::ConnectionLost,
                    "Cannot subscribe on a closed session",
                ));
            }
            if !session.connected {
                return Err(FeedError::bad_action(
                    "Cannot subscribe before the session is connected",
                ));
            }
            // registered before SUBSCRIBE goes out so no early MESSAGE is lost
            session.subscriptions.insert(id.clone(), tx);
        }

        debug!("Subscribing to {} as {}", destination, id);
        let frame = StompFrame::new(StompCommand::Subscribe)
            .header(headers::ID, id.clone())
            .header(headers::DESTINATION, destination)
            .header(headers::ACK, "auto");
        if let Err(e) = self.send_frame(frame).await {
            self.session.lock().await.subscriptions.remove(&id);
            return Err(e);
        }

        Ok(StompSubscription {
            subscription: FeedSubscription::new(id, destination),
            messages: rx,
        })
    }

    /// Cancels a subscription; its message stream ends
    pub async fn unsubscribe(&self, subscription: &mut FeedSubscription) -> Result<()> {
        if subscription.state == SubscriptionState::Cancelled {
            return Ok(());
        }
        subscription.state = SubscriptionState::Cancelled;
        self.session
            .lock()
            .await
            .subscriptions
            .remove(&subscription.id);

        debug!("Unsubscribing {}", subscription.id);
        self.send_frame(
            StompFrame::new(StompCommand::Unsubscribe)
                .header(headers::ID, subscription.id.clone()),
        )
        .await
    }

    /// Sends a message to `destination`
    pub async fn send(&self, destination: &str, content_type: &str, body: String) -> Result<()> {
        if !self.is_connected().await {
            return Err(FeedError::bad_action(
                "Cannot send before the session is connected",
            ));
        }
        self.send_frame(
            StompFrame::new(StompCommand::Send)
                .header(headers::DESTINATION, destination)
                .header(headers::CONTENT_TYPE, content_type)
                .with_body(body),
        )
        .await
    }

    /// Sends DISCONNECT, waits briefly for its RECEIPT and closes the transport.
    ///
    /// A session the server already ended skips the DISCONNECT exchange but
    /// still releases the transport. Later calls do nothing.
    pub async fn disconnect(&self) -> Result<()> {
        let receipt = format!(
            "disconnect-{}",
            self.next_receipt_id.fetch_add(1, Ordering::SeqCst)
        );
        let (tx, rx) = oneshot::channel();
        let was_connected = {
            let mut session = self.session.lock().await;
            if session.closing {
                return Ok(());
            }
            session.closing = true;
            let live = session.connected && !session.closed;
            if live {
                session.pending_receipts.insert(receipt.clone(), tx);
            }
            live
        };

        if was_connected {
            debug!("Sending DISCONNECT");
            let frame =
                StompFrame::new(StompCommand::Disconnect).header(headers::RECEIPT, receipt);
            match self.send_frame(frame).await {
                Ok(()) => {
                    if tokio::time::timeout(self.config.disconnect_timeout, rx)
                        .await
                        .is_err()
                    {
                        debug!("No RECEIPT for DISCONNECT, closing anyway");
                    }
                }
                Err(e) => debug!("Could not send DISCONNECT: {}", e),
            }
        }

        self.stop_heartbeat();
        // dropping the sender closes the transport
        self.outgoing.lock().await.take();
        {
            let mut session = self.session.lock().await;
            session.connected = false;
            session.subscriptions.clear();
        }
        Ok(())
    }

    /// Whether CONNECTED was received and the session has not ended
    pub async fn is_connected(&self) -> bool {
        let session = self.session.lock().await;
        session.connected && !session.closed && !session.closing
    }

    /// Details from the server's CONNECTED frame
    pub async fn connection_details(&self) -> Option<ConnectionDetails> {
        self.session.lock().await.details.clone()
    }

    /// Adds a listener for session errors raised after the handshake
    pub async fn add_error_listener(&self, listener: ErrorListener) -> Uuid {
        let id = Uuid::new_v4();
        self.error_listeners.lock().await.insert(id, listener);
        id
    }

    pub async fn remove_error_listener(&self, id: &Uuid) {
        self.error_listeners.lock().await.remove(id);
    }

    async fn send_frame(&self, frame: StompFrame) -> Result<()> {
        let sender = self.outgoing.lock().await.clone().ok_or_else(|| {
            FeedError::new(FeedErrorType::ConnectionLost, "Transport is closed")
        })?;
        sender.send(frame.encode()).await?;
        Ok(())
    }

    async fn start_heartbeat(&self, details: &ConnectionDetails) {
        let Some(period) = heartbeat_period(self.config.heartbeat, details.server_heartbeat.1)
        else {
            return;
        };
        let Some(sender) = self.outgoing.lock().await.clone() else {
            return;
        };

        debug!("Sending heart-beats every {:?}", period);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if sender.send(HEARTBEAT_EOL.to_string()).await.is_err() {
                    break;
                }
            }
        });

        if let Ok(mut heartbeat) = self.heartbeat.lock() {
            if let Some(previous) = heartbeat.replace(task) {
                previous.abort();
            }
        }
    }

    fn stop_heartbeat(&self) {
        if let Ok(mut heartbeat) = self.heartbeat.lock() {
            if let Some(task) = heartbeat.take() {
                task.abort();
            }
        }
    }

    async fn read_loop(
        mut incoming: mpsc::Receiver<TransportEvent>,
        session: Arc<Mutex<SessionState>>,
        error_listeners: Arc<Mutex<HashMap<Uuid, ErrorListener>>>,
    ) {
        while let Some(event) = incoming.recv().await {
            match event {
                TransportEvent::Message(text) => {
                    let (frames, outcome) = StompFrame::decode_prefix(&text);
                    for frame in frames {
                        Self::dispatch(frame, &session, &error_listeners).await;
                    }
                    if let Err(e) = outcome {
                        warn!("Dropping rest of undecodable transport message: {}", e);
                        // a handshake that got a garbled reply will not get another one
                        if let Some(tx) = session.lock().await.pending_connect.take() {
                            let _ = tx.send(Err(e));
                        }
                    }
                }
                TransportEvent::Closed { reason, is_error } => {
                    if is_error {
                        error!("Transport failed: {}", reason);
                    }
                    Self::handle_close(reason, &session, &error_listeners).await;
                    return;
                }
            }
        }

        Self::handle_close("Transport ended".to_string(), &session, &error_listeners).await;
    }

    async fn dispatch(
        frame: StompFrame,
        session: &Arc<Mutex<SessionState>>,
        error_listeners: &Arc<Mutex<HashMap<Uuid, ErrorListener>>>,
    ) {
        debug!("Received {} frame", frame.command);
        match frame.command {
            StompCommand::Connected => {
                let details = parse_connection_details(&frame);
                let mut session = session.lock().await;
                session.connected = true;
                session.details = Some(details.clone());
                match session.pending_connect.take() {
                    Some(tx) => {
                        let _ = tx.send(Ok(details));
                    }
                    None => warn!("Unexpected CONNECTED frame"),
                }
            }
            StompCommand::Message => {
                let Some(id) = frame.get_header(headers::SUBSCRIPTION).map(str::to_string)
                else {
                    warn!("MESSAGE frame without subscription header");
                    return;
                };
                let mut session = session.lock().await;
                match session.subscriptions.get(&id) {
                    Some(tx) => {
                        if tx.send(frame).is_err() {
                            debug!("Subscription {} has no receiver anymore", id);
                            session.subscriptions.remove(&id);
                        }
                    }
                    None => warn!("Received message for unknown subscription: {}", id),
                }
            }
            StompCommand::Receipt => {
                let Some(id) = frame.get_header(headers::RECEIPT_ID) else {
                    warn!("RECEIPT frame without receipt-id header");
                    return;
                };
                if let Some(tx) = session.lock().await.pending_receipts.remove(id) {
                    let _ = tx.send(());
                }
            }
            StompCommand::Error => {
                let message = frame
                    .get_header(headers::MESSAGE)
                    .map(str::to_string)
                    .unwrap_or_else(|| frame.body.clone());
                let pending = {
                    let mut session = session.lock().await;
                    let pending = session.pending_connect.take();
                    if pending.is_none() {
                        // the server closes the connection after ERROR
                        session.connected = false;
                        session.closed = true;
                        session.subscriptions.clear();
                        session.pending_receipts.clear();
                    }
                    pending
                };
                match pending {
                    Some(tx) => {
                        let _ = tx.send(Err(FeedError::new(
                            FeedErrorType::ConnectFailure,
                            message,
                        )));
                    }
                    None => {
                        Self::publish_error(
                            error_listeners,
                            FeedError::new(
                                FeedErrorType::ConnectionLost,
                                format!("Server error: {}", message),
                            ),
                        )
                        .await
                    }
                }
            }
            other => warn!("Unexpected {} frame from server", other),
        }
    }

    async fn handle_close(
        reason: String,
        session: &Arc<Mutex<SessionState>>,
        error_listeners: &Arc<Mutex<HashMap<Uuid, ErrorListener>>>,
    ) {
        debug!("Transport closed: {}", reason);
        let lost = {
            let mut session = session.lock().await;
            session.closed = true;
            session.subscriptions.clear();
            session.pending_receipts.clear();
            if let Some(tx) = session.pending_connect.take() {
                let _ = tx.send(Err(FeedError::new(
                    FeedErrorType::ConnectFailure,
                    reason.clone(),
                )));
            }
            let lost = session.connected && !session.closing;
            session.connected = false;
            lost
        };

        if lost {
            Self::publish_error(
                error_listeners,
                FeedError::new(
                    FeedErrorType::ConnectionLost,
                    format!("Connection lost: {}", reason),
                ),
            )
            .await;
        }
    }

    async fn publish_error(
        error_listeners: &Arc<Mutex<HashMap<Uuid, ErrorListener>>>,
        error: FeedError,
    ) {
        let listeners = error_listeners.lock().await;
        if listeners.is_empty() {
            error!("Unhandled STOMP error: {}", error);
            return;
        }
        for listener in listeners.values() {
            listener(&error);
        }
    }
}

impl Drop for StompClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.stop_heartbeat();
    }
}

fn parse_connection_details(frame: &StompFrame) -> ConnectionDetails {
    let server_heartbeat = frame
        .get_header(headers::HEART_BEAT)
        .and_then(|value| {
            let (send, receive) = value.split_once(',')?;
            Some((send.trim().parse().ok()?, receive.trim().parse().ok()?))
        })
        .unwrap_or((0, 0));

    ConnectionDetails {
        protocol_version: frame.get_header(headers::VERSION).map(str::to_string),
        server: frame.get_header(headers::SERVER).map(str::to_string),
        session: frame.get_header(headers::SESSION).map(str::to_string),
        server_heartbeat,
    }
}

/// Outgoing heart-beat period agreed between what the client offers and what
/// the server wants to receive, or `None` when either side opts out.
fn heartbeat_period(client_offer: Duration, server_wants_ms: u64) -> Option<Duration> {
    let client_ms = client_offer.as_millis() as u64;
    if client_ms == 0 || server_wants_ms == 0 {
        return None;
    }
    Some(Duration::from_millis(client_ms.max(server_wants_ms)))
}
