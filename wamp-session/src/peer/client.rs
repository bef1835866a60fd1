use std::{
    panic::AssertUnwindSafe,
    sync::Arc,
};

use anyhow::{
    Context,
    Result,
};
use futures_util::FutureExt;
use log::{
    info,
    warn,
};
use tokio::sync::Mutex;

use crate::{
    core::{
        close::CloseReason,
        error::ValidationError,
        uri::Uri,
    },
    peer::{
        config::SessionConfig,
        connector::Connector,
        handler::{
            Procedure,
            Subscription,
        },
        proxy::Rpc,
        registry::Registry,
        session::{
            ProcedureOptions,
            Session,
            WelcomeInfo,
        },
    },
};

/// A capability declared on a client, activated every time the client starts.
enum Capability<N> {
    Procedure {
        procedure: N,
        options: ProcedureOptions,
        handler: Arc<dyn Procedure>,
    },
    Subscription {
        topic: N,
        handler: Arc<dyn Subscription>,
    },
}

fn parse_uri(value: String) -> Result<Uri> {
    Uri::try_from(value).map_err(|err| ValidationError::new(err.to_string()).into())
}

/// An object for building a [`Client`].
///
/// Procedures and subscriptions are declared up front, in the order they should be activated.
pub struct ClientBuilder {
    realm: String,
    connector: Box<dyn Connector>,
    session_config: SessionConfig,
    registry: Registry,
    capabilities: Vec<Capability<String>>,
}

impl ClientBuilder {
    pub fn new<S>(realm: S, connector: Box<dyn Connector>) -> Self
    where
        S: Into<String>,
    {
        Self {
            realm: realm.into(),
            connector,
            session_config: SessionConfig::default(),
            registry: Registry::default(),
            capabilities: Vec::new(),
        }
    }

    pub fn session_config(mut self, session_config: SessionConfig) -> Self {
        self.session_config = session_config;
        self
    }

    /// Shares a registry of active procedure names with other clients.
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Declares a procedure, registered with default options.
    pub fn procedure<S>(self, procedure: S, handler: Arc<dyn Procedure>) -> Self
    where
        S: Into<String>,
    {
        self.procedure_with_options(procedure, ProcedureOptions::default(), handler)
    }

    pub fn procedure_with_options<S>(
        mut self,
        procedure: S,
        options: ProcedureOptions,
        handler: Arc<dyn Procedure>,
    ) -> Self
    where
        S: Into<String>,
    {
        self.capabilities.push(Capability::Procedure {
            procedure: procedure.into(),
            options,
            handler,
        });
        self
    }

    /// Declares a subscription.
    pub fn subscription<S>(mut self, topic: S, handler: Arc<dyn Subscription>) -> Self
    where
        S: Into<String>,
    {
        self.capabilities.push(Capability::Subscription {
            topic: topic.into(),
            handler,
        });
        self
    }

    /// Builds the client, validating every declaration.
    pub fn build(self) -> Result<Client> {
        parse_uri(self.realm.clone())?;
        let capabilities = self
            .capabilities
            .into_iter()
            .map(|capability| match capability {
                Capability::Procedure {
                    procedure,
                    options,
                    handler,
                } => Ok(Capability::Procedure {
                    procedure: parse_uri(procedure)?,
                    options,
                    handler,
                }),
                Capability::Subscription { topic, handler } => Ok(Capability::Subscription {
                    topic: parse_uri(topic)?,
                    handler,
                }),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Client {
            realm: self.realm,
            session: Session::new(self.session_config, self.connector)?,
            registry: self.registry,
            capabilities,
            registered: Mutex::new(Vec::new()),
        })
    }
}

/// A client with a fixed set of procedures and subscriptions.
///
/// Starting the client joins the realm and activates every declared capability before returning.
pub struct Client {
    realm: String,
    session: Session,
    registry: Registry,
    capabilities: Vec<Capability<Uri>>,
    registered: Mutex<Vec<Uri>>,
}

impl Client {
    /// The underlying session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Starts the client.
    ///
    /// Returns only after the router has confirmed every declared procedure and subscription. If
    /// any of them fails, the session is ended and the error is returned.
    pub async fn start(&self) -> Result<WelcomeInfo> {
        // Procedures from a lost connection are no longer active.
        self.release().await;
        let welcome = self.session.begin(&self.realm).await?;
        if let Err(err) = self.activate().await {
            self.release().await;
            if let Err(end_err) = self.session.end(CloseReason::Normal).await {
                warn!("Failed to end session after failed start: {end_err:#}");
            }
            return Err(err.context(format!("failed to start client on {}", self.realm)));
        }
        info!(
            "Client on {} started with {} capabilities",
            self.realm,
            self.capabilities.len()
        );
        Ok(welcome)
    }

    async fn activate(&self) -> Result<()> {
        for capability in &self.capabilities {
            match capability {
                Capability::Procedure {
                    procedure,
                    options,
                    handler,
                } => {
                    self.session
                        .register_with_options(procedure.as_ref(), options.clone(), handler.clone())
                        .await?;
                    self.registry.insert(procedure.clone()).await;
                    self.registered.lock().await.push(procedure.clone());
                }
                Capability::Subscription { topic, handler } => {
                    self.session
                        .subscribe(topic.as_ref(), handler.clone())
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn release(&self) {
        let registered = std::mem::take(&mut *self.registered.lock().await);
        for procedure in registered {
            self.registry.remove(&procedure).await;
        }
    }

    /// Stops the client with a GOODBYE round trip.
    ///
    /// Fails with [`SessionError::NotActive`][`crate::core::error::SessionError::NotActive`] if
    /// the client is not started.
    pub async fn stop(&self) -> Result<()> {
        self.release().await;
        self.session
            .end(CloseReason::Normal)
            .await
            .with_context(|| format!("failed to stop client on {}", self.realm))
    }

    /// Starts the client, runs `body`, and stops the client.
    ///
    /// The client is stopped even if `body` fails or panics. A panic is resumed after stopping.
    pub async fn scoped<'c, F, Fut, T>(&'c self, body: F) -> Result<T>
    where
        F: FnOnce(&'c Self) -> Fut,
        Fut: Future<Output = Result<T>> + 'c,
    {
        self.start().await?;
        let result = AssertUnwindSafe(body(self)).catch_unwind().await;
        let stopped = self.stop().await;
        match result {
            Err(panic) => {
                if let Err(err) = stopped {
                    warn!("Failed to stop client after panic: {err:#}");
                }
                std::panic::resume_unwind(panic)
            }
            Ok(Err(err)) => {
                if let Err(stop_err) = stopped {
                    warn!("Failed to stop client after error: {stop_err:#}");
                }
                Err(err)
            }
            Ok(Ok(value)) => {
                stopped?;
                Ok(value)
            }
        }
    }

    /// Creates a proxy for calling procedures known to this client's registry, along with
    /// procedures registered by this client.
    pub async fn rpc(&self) -> Rpc<'_> {
        let mut procedures = self.registry.procedures().await;
        procedures.extend(self.session.registrations().await.into_values());
        Rpc::new(&self.session, procedures)
    }
}
