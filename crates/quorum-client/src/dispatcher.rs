use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tonic::Request;
use tracing::{debug, warn};

use quorum_cluster::{ActiveChannel, ChannelManager};
use quorum_core::{ClientSettings, Credentials, Error, OperationOptions, Result, Status};

use crate::exceptions::ExceptionMap;
use crate::metadata::apply_credentials;

/// Typed responses of a server-streaming call.
pub type ResponseStream<T> = BoxStream<'static, Result<T>>;

struct OpenCall {
    channel: Arc<ActiveChannel>,
    responses: quorum_core::ResponseStream,
    deadline: Instant,
    timeout: Duration,
}

/// Runs remote operations on the current channel.
///
/// Every call works on its own copy of the operation options. Failures are
/// translated through the exception map; a failure showing the node can no
/// longer serve the preference marks the channel broken, and the call itself
/// is not retried.
#[derive(Clone)]
pub struct CallDispatcher {
    channels: Arc<ChannelManager>,
    exceptions: Arc<ExceptionMap>,
    default_credentials: Option<Credentials>,
    default_options: OperationOptions,
}

impl CallDispatcher {
    pub fn new(
        channels: Arc<ChannelManager>,
        exceptions: ExceptionMap,
        settings: &ClientSettings,
    ) -> Self {
        Self {
            channels,
            exceptions: Arc::new(exceptions),
            default_credentials: settings.default_credentials.clone(),
            default_options: settings.operation_options.clone(),
        }
    }

    pub fn channels(&self) -> &Arc<ChannelManager> {
        &self.channels
    }

    pub fn exceptions(&self) -> &ExceptionMap {
        &self.exceptions
    }

    pub fn default_options(&self) -> &OperationOptions {
        &self.default_options
    }

    /// Single-response call. A call that completes without a response item
    /// decodes from `null`, so `()` works for operations with no result.
    pub async fn invoke<Req, Resp>(
        &self,
        method: &str,
        request: &Req,
        credentials: Option<&Credentials>,
        options: Option<&OperationOptions>,
        cancel: &CancellationToken,
    ) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned + Default,
    {
        let options = self.resolve_options(options);

        let result = async {
            let payload = encode(method, request)?;
            let mut call = self
                .open(method, payload, credentials, &options, cancel)
                .await?;
            let value = self
                .next_value(&mut call, cancel)
                .await?
                .unwrap_or(Value::Null);
            decode(method, value)
        }
        .await;

        match result {
            Ok(response) => Ok(response),
            Err(e) => match self.surface(method, e, &options) {
                Some(e) => Err(e),
                None => Ok(Resp::default()),
            },
        }
    }

    /// Server-streaming call. Nothing is sent until the stream is first polled,
    /// and dropping the stream cancels the call.
    pub fn invoke_streaming<Req, Resp>(
        &self,
        method: &str,
        request: &Req,
        credentials: Option<&Credentials>,
        options: Option<&OperationOptions>,
        cancel: &CancellationToken,
    ) -> ResponseStream<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned + Send + 'static,
    {
        let dispatcher = self.clone();
        let method = method.to_string();
        let payload = encode(&method, request);
        let credentials = credentials.cloned();
        let options = self.resolve_options(options);
        let cancel = cancel.clone();

        Box::pin(async_stream::stream! {
            let opened = match payload {
                Ok(payload) => {
                    dispatcher
                        .open(&method, payload, credentials.as_ref(), &options, &cancel)
                        .await
                }
                Err(e) => Err(e),
            };

            let mut call = match opened {
                Ok(call) => call,
                Err(e) => {
                    if let Some(e) = dispatcher.surface(&method, e, &options) {
                        yield Err(e);
                    }
                    return;
                }
            };

            loop {
                let next = dispatcher
                    .next_value(&mut call, &cancel)
                    .await
                    .and_then(|value| value.map(|v| decode::<Resp>(&method, v)).transpose());

                match next {
                    Ok(Some(item)) => yield Ok(item),
                    Ok(None) => break,
                    Err(e) => {
                        if let Some(e) = dispatcher.surface(&method, e, &options) {
                            yield Err(e);
                        }
                        break;
                    }
                }
            }
        })
    }

    fn resolve_options(&self, options: Option<&OperationOptions>) -> OperationOptions {
        options
            .unwrap_or(&self.default_options)
            .resolve(self.default_options.timeout())
    }

    async fn open(
        &self,
        method: &str,
        payload: Value,
        credentials: Option<&Credentials>,
        options: &OperationOptions,
        cancel: &CancellationToken,
    ) -> Result<OpenCall> {
        let channel = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            channel = self.channels.current_channel() => channel?,
        };

        let timeout = options.timeout();
        let mut request = Request::new(payload);
        apply_credentials(
            request.metadata_mut(),
            credentials.or(self.default_credentials.as_ref()),
        )?;
        request.set_timeout(timeout);

        metrics::counter!("quorum_calls_total").increment(1);
        debug!("invoking {} on {}", method, channel.endpoint());

        // the deadline covers opening the call as well as reading it
        let deadline = Instant::now() + timeout;
        let opened = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            opened = timeout_at(deadline, channel.call(method, request)) => opened,
        };

        match opened {
            Err(_) => Err(Error::DeadlineExceeded {
                timeout_ms: timeout.as_millis() as u64,
            }),
            Ok(Ok(responses)) => Ok(OpenCall {
                channel,
                responses,
                deadline,
                timeout,
            }),
            Ok(Err(status)) => Err(self.fail(&channel, status)),
        }
    }

    async fn next_value(
        &self,
        call: &mut OpenCall,
        cancel: &CancellationToken,
    ) -> Result<Option<Value>> {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            next = timeout_at(call.deadline, call.responses.next()) => next,
        };

        match next {
            Err(_) => Err(Error::DeadlineExceeded {
                timeout_ms: call.timeout.as_millis() as u64,
            }),
            Ok(None) => Ok(None),
            Ok(Some(Ok(value))) => Ok(Some(value)),
            Ok(Some(Err(status))) => Err(self.fail(&call.channel, status)),
        }
    }

    fn fail(&self, channel: &ActiveChannel, status: Status) -> Error {
        let error = self.exceptions.translate(&status);
        if error.invalidates_channel() {
            warn!(
                "{} reported {}, rediscovering on next call",
                channel.endpoint(),
                error
            );
            self.channels.mark_broken(channel);
        }
        error
    }

    /// The error to hand to the caller, or `None` when throw-on-failure is off
    /// and the server reported the failure.
    fn surface(&self, method: &str, error: Error, options: &OperationOptions) -> Option<Error> {
        metrics::counter!("quorum_call_failures_total").increment(1);
        if !options.throw_on_failure && error.is_operation_failure() {
            debug!("{} failed, returning empty result: {}", method, error);
            return None;
        }
        Some(error)
    }
}

fn encode<Req: Serialize + ?Sized>(method: &str, request: &Req) -> Result<Value> {
    serde_json::to_value(request)
        .map_err(|e| Error::Codec(format!("cannot encode {} request: {}", method, e)))
}

fn decode<Resp: DeserializeOwned>(method: &str, value: Value) -> Result<Resp> {
    serde_json::from_value(value)
        .map_err(|e| Error::Codec(format!("invalid {} response: {}", method, e)))
}
