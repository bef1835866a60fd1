use std::ops::ControlFlow;

use anyhow::{
    Error,
    Result,
};
use async_trait::async_trait;
use futures_util::{
    SinkExt,
    StreamExt,
};
use log::{
    debug,
    error,
    trace,
    warn,
};
use tokio::{
    sync::{
        broadcast,
        mpsc::{
            UnboundedReceiver,
            UnboundedSender,
            unbounded_channel,
        },
    },
    task::JoinHandle,
};

use crate::{
    core::{
        error::ConnectionError,
        stream::{
            MessageStream,
            StreamMessage,
        },
    },
    message::message::Message,
    serializer::serializer::Serializer,
    transport::transport::Transport,
};

/// Consumer of every message received by a [`Service`].
///
/// Messages are handled one at a time, in the order they were received.
#[async_trait]
pub trait MessageHandler: Send {
    /// Handles a single inbound message.
    ///
    /// Returning [`ControlFlow::Break`] ends the service after queued outbound messages are
    /// flushed.
    async fn handle_message(&mut self, message: Message) -> ControlFlow<()>;

    /// Called exactly once, after the service stops reading from the transport.
    ///
    /// `result` is the error that ended the service, if any.
    async fn handle_end(&mut self, result: Result<()>);
}

/// A handle to an asynchronously-running [`Service`].
#[derive(Debug)]
pub struct ServiceHandle {
    join_handle: JoinHandle<()>,
    cancel_tx: broadcast::Sender<()>,
    message_tx: UnboundedSender<Message>,
}

impl ServiceHandle {
    /// Waits for the task running the service to finish.
    pub async fn join(self) -> Result<()> {
        self.join_handle.await.map_err(Error::new)
    }

    /// Cancels the service.
    ///
    /// Messages already queued for sending are still written out.
    pub fn cancel(&self) {
        // The service may have already ended on its own.
        self.cancel_tx.send(()).ok();
    }

    /// Aborts the task running the service without any cleanup.
    pub fn abort(&self) {
        self.join_handle.abort();
    }

    /// Checks if the task running the service has finished.
    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// The channel for messages to send over the transport.
    pub fn message_tx(&self) -> UnboundedSender<Message> {
        self.message_tx.clone()
    }
}

/// The asynchronous task that owns a transport.
///
/// The service is the single reader and single writer of its transport. Received messages are
/// passed to a [`MessageHandler`] inline. Messages to send are queued on an unbounded channel by
/// any number of producers.
pub struct Service {
    name: String,
    stream: MessageStream,
    cancel_tx: broadcast::Sender<()>,
    cancel_rx: broadcast::Receiver<()>,
    message_tx: UnboundedSender<Message>,
    message_rx: UnboundedReceiver<Message>,
}

impl Service {
    pub fn new(
        name: String,
        transport: Box<dyn Transport>,
        serializer: Box<dyn Serializer>,
    ) -> Self {
        let (cancel_tx, cancel_rx) = broadcast::channel(1);
        let (message_tx, message_rx) = unbounded_channel();
        Self {
            name,
            stream: MessageStream::new(transport, serializer),
            cancel_tx,
            cancel_rx,
            message_tx,
            message_rx,
        }
    }

    /// The channel for messages to send over the transport, available before the service starts.
    pub fn message_tx(&self) -> UnboundedSender<Message> {
        self.message_tx.clone()
    }

    /// Starts the service on a new task.
    ///
    /// All future interactions with the service go through the returned handle.
    pub fn start(self, handler: Box<dyn MessageHandler>) -> ServiceHandle {
        let cancel_tx = self.cancel_tx.clone();
        let message_tx = self.message_tx.clone();
        let join_handle = tokio::spawn(self.run(handler));
        ServiceHandle {
            join_handle,
            cancel_tx,
            message_tx,
        }
    }

    async fn run(mut self, mut handler: Box<dyn MessageHandler>) {
        let result = self.service_loop(handler.as_mut()).await;
        if let Err(err) = &result {
            error!("Service {} failed: {err:#}", self.name);
        }
        self.end().await;
        handler.handle_end(result).await;
        debug!("Service {} ended", self.name);
    }

    async fn service_loop(&mut self, handler: &mut dyn MessageHandler) -> Result<()> {
        loop {
            tokio::select! {
                message = self.stream.next() => {
                    match message {
                        Some(Ok(StreamMessage::Ping(data))) => {
                            self.stream.send(StreamMessage::Ping(data)).await?;
                        }
                        Some(Ok(StreamMessage::Message(message))) => {
                            trace!("Service {} received {}: {message:?}", self.name, message.message_name());
                            if handler.handle_message(message).await.is_break() {
                                return Ok(());
                            }
                        }
                        Some(Ok(StreamMessage::Malformed(err))) => {
                            warn!("Service {} dropped malformed message: {err:#}", self.name);
                        }
                        Some(Err(err)) => {
                            return Err(ConnectionError::new(format!("{err:#}")).into());
                        }
                        None => {
                            return Err(ConnectionError::new("transport closed by remote").into());
                        }
                    }
                }
                message = self.message_rx.recv() => {
                    // The service holds a sender itself, so the channel never closes here.
                    if let Some(message) = message {
                        self.send(message).await?;
                    }
                }
                _ = self.cancel_rx.recv() => {
                    return Ok(());
                }
            }
        }
    }

    async fn send(&mut self, message: Message) -> Result<()> {
        trace!(
            "Service {} sending {}: {message:?}",
            self.name,
            message.message_name()
        );
        self.stream
            .send(StreamMessage::Message(message))
            .await
            .map_err(|err| ConnectionError::new(format!("{err:#}")).into())
    }

    async fn end(&mut self) {
        // Flush replies queued by the handler before it asked to stop.
        while let Ok(message) = self.message_rx.try_recv() {
            if let Err(err) = self.send(message).await {
                debug!("Service {} could not flush message: {err:#}", self.name);
                break;
            }
        }
        // The stream may already be closed.
        self.stream.close().await.ok();
    }
}
