use std::future::Future;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tokio::time::timeout;

use crate::config::{ExecutionMode, HarnessConfig};
use crate::error::SignalError;
use crate::harness::{DoneReport, TestContext, TestStatus};
use crate::router::SignalRouter;
use crate::signaling::Signaling;
use crate::transport::{rendezvous_round_trip, DirectTransport, RelayTransport};

/// Runs signaling test bodies in the configured execution mode.
///
/// Loopback mode cross-wires two in-process instances and runs the body for
/// both roles concurrently. Cross-instance mode gates the first test on a
/// one-time rendezvous with the peer process, runs the body for the
/// configured role over the relay, and reconciles verdicts at completion.
pub struct TestCoordinator {
    config: HarnessConfig,
    peer_reachable: OnceCell<()>,
}

impl TestCoordinator {
    pub fn new(config: HarnessConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            peer_reachable: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run one test body and return the reconciled verdict.
    ///
    /// The body receives the signaling instance and whether it plays the
    /// offerer; in loopback mode it is invoked once per role. `test_index`
    /// selects the relay endpoint and must match on both sides.
    pub async fn run<F, Fut>(&self, test_index: u32, body: F) -> Result<DoneReport, SignalError>
    where
        F: Fn(Arc<Signaling>, bool) -> Fut,
        Fut: Future<Output = Result<(), SignalError>> + Send + 'static,
    {
        match self.config.mode {
            ExecutionMode::Loopback => self.run_loopback(body).await,
            ExecutionMode::CrossInstance => self.run_cross_instance(test_index, body).await,
        }
    }

    async fn run_loopback<F, Fut>(&self, body: F) -> Result<DoneReport, SignalError>
    where
        F: Fn(Arc<Signaling>, bool) -> Fut,
        Fut: Future<Output = Result<(), SignalError>> + Send + 'static,
    {
        let offer_router = Arc::new(SignalRouter::new());
        let answer_router = Arc::new(SignalRouter::new());
        let (to_answerer, to_offerer) =
            DirectTransport::pair(Arc::clone(&offer_router), Arc::clone(&answer_router));
        let offerer = Signaling::new(Arc::new(to_answerer), offer_router);
        let answerer = Signaling::new(Arc::new(to_offerer), answer_router);

        let context = TestContext::new();
        context.start();
        let close_offerer = Arc::clone(&offerer);
        context.add_cleanup(move || close_offerer.close());
        let close_answerer = Arc::clone(&answerer);
        context.add_cleanup(move || close_answerer.close());

        let both = async {
            tokio::try_join!(
                body(Arc::clone(&offerer), true),
                body(Arc::clone(&answerer), false)
            )
        };
        match timeout(self.config.test_timeout, both).await {
            Ok(Ok(_)) => context.record(TestStatus::Pass, None),
            Ok(Err(err)) => context.record(TestStatus::Fail, Some(err.to_string())),
            Err(_) => context.record(TestStatus::Timeout, Some("test body timed out".into())),
        }
        context.run_cleanups();
        Ok(context.current_report())
    }

    async fn run_cross_instance<F, Fut>(
        &self,
        test_index: u32,
        body: F,
    ) -> Result<DoneReport, SignalError>
    where
        F: Fn(Arc<Signaling>, bool) -> Fut,
        Fut: Future<Output = Result<(), SignalError>> + Send + 'static,
    {
        self.ensure_peer_reachable().await?;

        let router = Arc::new(SignalRouter::new());
        let url = self.config.signaling_url(test_index)?;
        let transport = Arc::new(RelayTransport::connect(url, Arc::clone(&router)));
        let signaling = Signaling::new(transport, router);

        let context = TestContext::new();
        context.start();
        let close = Arc::clone(&signaling);
        context.add_cleanup(move || close.close());

        let is_offerer = self.config.role.is_offerer();
        match timeout(
            self.config.test_timeout,
            body(Arc::clone(&signaling), is_offerer),
        )
        .await
        {
            Ok(Ok(())) => context.record(TestStatus::Pass, None),
            Ok(Err(err)) => context.record(TestStatus::Fail, Some(err.to_string())),
            Err(_) => context.record(TestStatus::Timeout, Some("test body timed out".into())),
        }

        // Completion override: exchange verdicts with the peer. A local pass
        // only stands if the remote agrees.
        let local = context.current_report();
        let remote_handle = signaling.done(&local)?;
        let remote = timeout(self.config.test_timeout, remote_handle.wait())
            .await
            .map_err(|_| SignalError::Setup("timed out waiting for the peer's report".into()))??;
        if local.status.is_pass() && !remote.status.is_pass() {
            let detail = remote
                .message
                .clone()
                .unwrap_or_else(|| "no message".to_string());
            context.downgrade(format!("peer reported {:?}: {detail}", remote.status));
        }
        context.run_cleanups();
        Ok(context.current_report())
    }

    /// Await the one-time relay round-trip confirming the peer process is
    /// reachable. Later tests reuse the confirmation.
    async fn ensure_peer_reachable(&self) -> Result<(), SignalError> {
        let url = self.config.rendezvous_url()?;
        self.peer_reachable
            .get_or_try_init(|| async {
                tracing::debug!(target = "signaling", url = %url, "waiting for peer process");
                rendezvous_round_trip(&url).await
            })
            .await?;
        Ok(())
    }
}
