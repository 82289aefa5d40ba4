//! Realtime feed client
//!
//! Connects to the server's STOMP endpoint, subscribes to the public topic
//! and renders every message it receives into a [`FeedView`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::messages::{render_payload, FeedMessage};
use crate::core::{
    client::{ConnectionDetails, ConnectionStateChangeListener, FeedConnectionState},
    errors::{FeedError, FeedErrorType, Result},
    subscription::FeedSubscription,
};
use crate::stomp::{
    client::{StompClient, StompSubscription},
    config::FeedClientConfig,
    connector::{TransportFactory, WebSocketConnector},
};
use crate::view::{FeedView, PageView, FAILURE_MESSAGE};

/// The one topic the client subscribes to
pub const PUBLIC_TOPIC: &str = "/public";

/// Destination the server broadcasts from to [`PUBLIC_TOPIC`]
pub const SEND_DESTINATION: &str = "/public.sendMessage";

const JSON_CONTENT_TYPE: &str = "application/json";

/// State shared with the receive loop and the session error listener
struct FeedInner<V: FeedView> {
    view: Arc<V>,
    state: Mutex<FeedConnectionState>,
    state_listeners: Mutex<HashMap<Uuid, ConnectionStateChangeListener>>,
}

impl<V: FeedView> FeedInner<V> {
    fn state(&self) -> FeedConnectionState {
        *lock(&self.state)
    }

    /// Moves to `next` if `allowed` accepts the current state.
    /// Returns the previous state, or the current one when refused.
    fn transition(
        &self,
        allowed: impl FnOnce(FeedConnectionState) -> bool,
        next: FeedConnectionState,
    ) -> std::result::Result<FeedConnectionState, FeedConnectionState> {
        let previous = {
            let mut state = lock(&self.state);
            let current = *state;
            if !allowed(current) {
                return Err(current);
            }
            *state = next;
            current
        };

        if previous != next {
            debug!("Feed state {} -> {}", previous, next);
            for listener in lock(&self.state_listeners).values() {
                listener(&next, &previous);
            }
        }
        Ok(previous)
    }

    fn on_error(&self, err: &FeedError) {
        error!("Feed connection failed: {}", err);
        let _ = self.transition(|s| s != FeedConnectionState::Closed, FeedConnectionState::Failed);
        self.view.show_status_error(FAILURE_MESSAGE);
    }

    fn on_message_received(&self, body: &str) -> Result<()> {
        let text = render_payload(body)?;
        self.view.append_entry(text);
        Ok(())
    }
}

/// The STOMP session the client currently owns
struct ActiveSession {
    stomp: Arc<StompClient>,
    error_listener: Uuid,
}

/// Client for the public feed.
///
/// Owns at most one connection and one subscription. `connect` is accepted
/// from `Idle` and `Failed` only; a second call while a connection is being
/// set up or is live is refused.
pub struct RealtimeFeedClient<V: FeedView> {
    config: FeedClientConfig,
    factory: Arc<dyn TransportFactory>,
    inner: Arc<FeedInner<V>>,
    session: tokio::sync::Mutex<Option<ActiveSession>>,
    subscription: tokio::sync::Mutex<Option<FeedSubscription>>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeFeedClient<PageView> {
    /// Client over a real WebSocket, rendering into an in-memory page
    pub fn with_websocket(config: FeedClientConfig) -> Self {
        let view = Arc::new(PageView::from_config(&config));
        Self::new(config, Arc::new(WebSocketConnector::new()), view)
    }
}

impl<V: FeedView> RealtimeFeedClient<V> {
    pub fn new(config: FeedClientConfig, factory: Arc<dyn TransportFactory>, view: Arc<V>) -> Self {
        Self {
            config,
            factory,
            inner: Arc::new(FeedInner {
                view,
                state: Mutex::new(FeedConnectionState::Idle),
                state_listeners: Mutex::new(HashMap::new()),
            }),
            session: tokio::sync::Mutex::new(None),
            subscription: tokio::sync::Mutex::new(None),
            receive_task: Mutex::new(None),
        }
    }

    /// Opens the connection and subscribes to [`PUBLIC_TOPIC`].
    ///
    /// Failures are shown in the view and returned.
    pub async fn connect(&self) -> Result<()> {
        if let Err(current) = self
            .inner
            .transition(|s| s.can_connect(), FeedConnectionState::Connecting)
        {
            return Err(FeedError::bad_action(format!(
                "Cannot connect while {}",
                current
            )));
        }

        // a failed session from an earlier attempt must not report into this one
        if let Err(e) = self.release_session().await {
            debug!("Could not release previous session: {}", e);
        }

        let url = self.config.endpoint_url();
        debug!("Connecting to {}", url);

        match self.establish(&url).await {
            Ok(stomp) => self.on_connected(stomp).await,
            Err(e) => {
                self.inner.on_error(&e);
                Err(e)
            }
        }
    }

    async fn establish(&self, url: &str) -> Result<Arc<StompClient>> {
        let transport = self.factory.open(url).await?;
        let stomp = Arc::new(StompClient::over(transport, &self.config));
        let details = stomp.connect(Vec::new()).await?;
        debug!(
            "Connected to {} (version {:?}, server {:?})",
            url, details.protocol_version, details.server
        );
        Ok(stomp)
    }

    async fn on_connected(&self, stomp: Arc<StompClient>) -> Result<()> {
        if self
            .inner
            .transition(
                |s| s == FeedConnectionState::Connecting,
                FeedConnectionState::Connected,
            )
            .is_err()
        {
            let _ = stomp.disconnect().await;
            return Err(FeedError::bad_action("Client was closed while connecting"));
        }

        let inner = self.inner.clone();
        let error_listener = stomp
            .add_error_listener(Box::new(move |err| inner.on_error(err)))
            .await;
        *self.session.lock().await = Some(ActiveSession {
            stomp: stomp.clone(),
            error_listener,
        });

        let StompSubscription {
            subscription,
            mut messages,
        } = match stomp.subscribe(PUBLIC_TOPIC).await {
            Ok(sub) => sub,
            Err(e) => {
                if let Err(release) = self.release_session().await {
                    debug!("Could not release session: {}", release);
                }
                self.inner.on_error(&e);
                return Err(e);
            }
        };
        debug!("Subscribed to {} as {}", PUBLIC_TOPIC, subscription.id);
        self.inner.view.hide_status();
        *self.subscription.lock().await = Some(subscription);

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            while let Some(frame) = messages.recv().await {
                if let Err(e) = inner.on_message_received(&frame.body) {
                    warn!("Dropping message from {}: {}", PUBLIC_TOPIC, e);
                }
            }
            debug!("Message stream for {} ended", PUBLIC_TOPIC);
        });
        if let Some(previous) = lock(&self.receive_task).replace(task) {
            previous.abort();
        }

        let _ = self.inner.transition(
            |s| s == FeedConnectionState::Connected,
            FeedConnectionState::Subscribed,
        );
        Ok(())
    }

    /// Shows the failure in the view and marks the client as failed
    pub fn on_error(&self, err: &FeedError) {
        self.inner.on_error(err);
    }

    /// Renders one message body into the log.
    ///
    /// A body that is not valid JSON is rejected with `InvalidMessage` and
    /// leaves the log untouched.
    pub fn on_message_received(&self, body: &str) -> Result<()> {
        self.inner.on_message_received(body)
    }

    /// Sends a message to the server for broadcast on the public topic
    pub async fn publish(&self, message: &FeedMessage) -> Result<()> {
        message.validate()?;

        let state = self.inner.state();
        if !state.is_live() {
            return Err(FeedError::bad_action(format!(
                "Cannot publish while {}",
                state
            )));
        }
        let stomp = self.active_stomp().await.ok_or_else(|| {
            FeedError::new(FeedErrorType::ConnectionLost, "No active connection")
        })?;

        stomp
            .send(SEND_DESTINATION, JSON_CONTENT_TYPE, message.to_json()?)
            .await
    }

    /// Unsubscribes, disconnects and stops the receive loop.
    /// The client cannot be connected again afterwards.
    pub async fn close(&self) -> Result<()> {
        if let Err(current) = self.inner.transition(
            |s| s != FeedConnectionState::Closed,
            FeedConnectionState::Closed,
        ) {
            debug!("Feed client already {}", current);
            return Ok(());
        }

        self.release_session().await
    }

    /// Tears down the current session, if any: unsubscribes while it is
    /// still live, detaches its error listener and closes the transport.
    async fn release_session(&self) -> Result<()> {
        let receive_task = lock(&self.receive_task).take();
        if let Some(task) = receive_task {
            task.abort();
        }
        let subscription = self.subscription.lock().await.take();
        let Some(ActiveSession {
            stomp,
            error_listener,
        }) = self.session.lock().await.take()
        else {
            return Ok(());
        };

        stomp.remove_error_listener(&error_listener).await;
        if let Some(mut subscription) = subscription {
            if stomp.is_connected().await {
                if let Err(e) = stomp.unsubscribe(&mut subscription).await {
                    debug!("Could not unsubscribe {}: {}", subscription.id, e);
                }
            }
        }
        stomp.disconnect().await
    }

    async fn active_stomp(&self) -> Option<Arc<StompClient>> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|session| session.stomp.clone())
    }

    pub fn state(&self) -> FeedConnectionState {
        self.inner.state()
    }

    pub fn view(&self) -> &Arc<V> {
        &self.inner.view
    }

    pub fn config(&self) -> &FeedClientConfig {
        &self.config
    }

    /// The active subscription, if any
    pub async fn subscription(&self) -> Option<FeedSubscription> {
        self.subscription.lock().await.clone()
    }

    /// Details of the active connection, if any
    pub async fn connection_details(&self) -> Option<ConnectionDetails> {
        let stomp = self.active_stomp().await?;
        stomp.connection_details().await
    }

    pub fn add_state_change_listener(&self, listener: ConnectionStateChangeListener) -> Uuid {
        let id = Uuid::new_v4();
        lock(&self.inner.state_listeners).insert(id, listener);
        id
    }

    pub fn remove_state_change_listener(&self, id: &Uuid) {
        lock(&self.inner.state_listeners).remove(id);
    }
}

impl<V: FeedView> Drop for RealtimeFeedClient<V> {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.receive_task).take() {
            task.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stomp::connector::TransportHandle;
    use crate::view::StatusStyle;
    use async_trait::async_trait;

    struct RefusingFactory;

    #[async_trait]
    impl TransportFactory for RefusingFactory {
        async fn open(&self, _url: &str) -> Result<TransportHandle> {
            Err(FeedError::new(
                FeedErrorType::ConnectFailure,
                "Connection refused",
            ))
        }
    }

    fn client() -> RealtimeFeedClient<PageView> {
        RealtimeFeedClient::new(
            FeedClientConfig::default(),
            Arc::new(RefusingFactory),
            Arc::new(PageView::new(None)),
        )
    }

    #[test]
    fn test_initial_state() {
        let client = client();
        assert_eq!(client.state(), FeedConnectionState::Idle);
        assert!(!client.view().status().hidden);
        assert!(client.view().entries().is_empty());
    }

    #[test]
    fn test_message_renders_canonical_json() {
        let client = client();
        client
            .on_message_received(r#"{ "sender": "alice", "content": "hi" }"#)
            .unwrap();

        let entries = client.view().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, r#"{"sender":"alice","content":"hi"}"#);
    }

    #[test]
    fn test_malformed_message_is_rejected() {
        let client = client();
        let err = client.on_message_received("<html>").unwrap_err();
        assert_eq!(err.error_type, FeedErrorType::InvalidMessage);
        assert!(client.view().entries().is_empty());

        client.on_message_received(r#"{"ok":true}"#).unwrap();
        assert_eq!(client.view().entries().len(), 1);
    }

    #[test]
    fn test_on_error_shows_failure() {
        let client = client();
        client.on_error(&FeedError::new(FeedErrorType::ConnectFailure, "boom"));

        let status = client.view().status();
        assert_eq!(status.text, FAILURE_MESSAGE);
        assert_eq!(status.style, StatusStyle::Error);
        assert!(client.view().entries().is_empty());
        assert_eq!(client.state(), FeedConnectionState::Failed);
    }

    #[tokio::test]
    async fn test_connect_failure_is_terminal_until_next_trigger() {
        let client = client();
        let err = client.connect().await.unwrap_err();
        assert_eq!(err.error_type, FeedErrorType::ConnectFailure);
        assert_eq!(client.state(), FeedConnectionState::Failed);
        assert_eq!(client.view().status().text, FAILURE_MESSAGE);

        // a fresh trigger is allowed from Failed
        let err = client.connect().await.unwrap_err();
        assert_eq!(err.error_type, FeedErrorType::ConnectFailure);
    }

    #[tokio::test]
    async fn test_state_listener_sees_transitions() {
        let client = client();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        client.add_state_change_listener(Box::new(move |new, old| {
            seen_clone.lock().unwrap().push((*old, *new));
        }));

        let _ = client.connect().await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (FeedConnectionState::Idle, FeedConnectionState::Connecting),
                (FeedConnectionState::Connecting, FeedConnectionState::Failed),
            ]
        );
    }

    #[tokio::test]
    async fn test_publish_requires_live_connection() {
        let client = client();
        let err = client
            .publish(&FeedMessage::new("hi", "2019-10-09 00:12:12+0100"))
            .await
            .unwrap_err();
        assert_eq!(err.error_type, FeedErrorType::BadAction);

        let err = client
            .publish(&FeedMessage::new("", "2019-10-09 00:12:12+0100"))
            .await
            .unwrap_err();
        assert_eq!(err.error_type, FeedErrorType::InvalidMessage);
    }

    #[tokio::test]
    async fn test_close_is_terminal() {
        let client = client();
        client.close().await.unwrap();
        assert_eq!(client.state(), FeedConnectionState::Closed);

        let err = client.connect().await.unwrap_err();
        assert_eq!(err.error_type, FeedErrorType::BadAction);
        assert!(client.close().await.is_ok());
    }
}
