//! Link pipeline
//!
//! A [`Link`] sees every operation on its way to the transport and every
//! result on its way back. [`Next`] is the remainder of the chain; a link
//! may run it more than once (the refresh link does, to retry).

use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::AuthLink;
use crate::logging::{ErrorLink, LogLink};
use crate::refresh::{RefreshLink, TokenRefresher};
use crate::session::TokenStore;
use crate::transport::Transport;
use crate::types::{GraphQLResponse, Operation};
use crate::Result;

/// Request/response interceptor in the client's call chain
#[async_trait]
pub trait Link: Send + Sync {
    /// Handle `operation`, usually by forwarding it through `next`
    async fn request(&self, operation: Operation, next: Next<'_>) -> Result<GraphQLResponse>;
}

/// Remainder of the chain after the current link
#[derive(Clone, Copy)]
pub struct Next<'a> {
    links: &'a [Arc<dyn Link>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    /// Forward `operation` to the next link, or to the transport at the end of the chain
    pub async fn run(self, operation: Operation) -> Result<GraphQLResponse> {
        match self.links.split_first() {
            Some((head, tail)) => {
                head.request(
                    operation,
                    Next {
                        links: tail,
                        transport: self.transport,
                    },
                )
                .await
            }
            None => self.transport.execute(&operation).await,
        }
    }
}

/// Ordered links ending in a transport
#[derive(Clone)]
pub struct LinkChain {
    links: Vec<Arc<dyn Link>>,
    transport: Arc<dyn Transport>,
}

impl LinkChain {
    /// Chain with no links, straight to the transport
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            links: Vec::new(),
            transport,
        }
    }

    /// Append a link; links run in the order they are added
    #[must_use]
    pub fn link(mut self, link: impl Link + 'static) -> Self {
        self.links.push(Arc::new(link));
        self
    }

    /// Log → Auth → Refresh → Error → transport
    pub fn standard(
        store: TokenStore,
        transport: Arc<dyn Transport>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self::new(transport)
            .link(LogLink)
            .link(AuthLink::new(store.clone()))
            .link(RefreshLink::new(store, refresher))
            .link(ErrorLink)
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub async fn execute(&self, operation: Operation) -> Result<GraphQLResponse> {
        Next {
            links: &self.links,
            transport: self.transport.as_ref(),
        }
        .run(operation)
        .await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport shared by the link tests

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::transport::Transport;
    use crate::types::{GraphQLResponse, Operation};
    use crate::{ClientError, Result};

    type Responder = Box<dyn Fn(&Operation) -> Result<GraphQLResponse> + Send + Sync>;

    /// Records every operation and answers from a queue, then from a fallback
    pub(crate) struct ScriptedTransport {
        pub(crate) seen: Mutex<Vec<Operation>>,
        queue: Mutex<VecDeque<Result<GraphQLResponse>>>,
        fallback: Responder,
    }

    impl ScriptedTransport {
        pub(crate) fn new(
            fallback: impl Fn(&Operation) -> Result<GraphQLResponse> + Send + Sync + 'static,
        ) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                queue: Mutex::new(VecDeque::new()),
                fallback: Box::new(fallback),
            }
        }

        pub(crate) fn ok(data: serde_json::Value) -> Self {
            Self::new(move |_| Ok(GraphQLResponse::from_data(data.clone())))
        }

        pub(crate) fn push(&self, result: Result<GraphQLResponse>) {
            self.queue.lock().unwrap().push_back(result);
        }

        pub(crate) fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        pub(crate) fn operations(&self) -> Vec<Operation> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, operation: &Operation) -> Result<GraphQLResponse> {
            self.seen.lock().unwrap().push(operation.clone());
            let queued = self.queue.lock().unwrap().pop_front();
            match queued {
                Some(result) => result,
                None => (self.fallback)(operation),
            }
        }
    }

    pub(crate) fn network_down(_: &Operation) -> Result<GraphQLResponse> {
        Err(ClientError::Network("connection refused".into()))
    }
}
