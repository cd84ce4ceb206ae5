use std::time::Duration;

use url::Url;

use crate::error::SignalError;

const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Which side of the exchange this instance plays. Role 0 offers, role 1
/// answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Offerer,
    Answerer,
}

impl Role {
    pub fn index(self) -> u8 {
        match self {
            Role::Offerer => 0,
            Role::Answerer => 1,
        }
    }

    pub fn from_index(index: u8) -> Result<Self, SignalError> {
        match index {
            0 => Ok(Role::Offerer),
            1 => Ok(Role::Answerer),
            other => Err(SignalError::Setup(format!("invalid role index {other}"))),
        }
    }

    pub fn is_offerer(self) -> bool {
        matches!(self, Role::Offerer)
    }

    pub fn peer(self) -> Role {
        match self {
            Role::Offerer => Role::Answerer,
            Role::Answerer => Role::Offerer,
        }
    }
}

/// How a test run reaches its peer: both roles in this process, or one role
/// per process behind a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Loopback,
    CrossInstance,
}

/// Execution configuration for a signaling test run, fixed at suite start.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub relay_url: Option<String>,
    pub role: Role,
    pub mode: ExecutionMode,
    pub test_timeout: Duration,
}

impl HarnessConfig {
    pub fn builder() -> HarnessConfigBuilder {
        HarnessConfigBuilder::new()
    }

    /// Loopback configuration: no relay, both roles in-process.
    pub fn loopback() -> Self {
        Self {
            relay_url: None,
            role: Role::Offerer,
            mode: ExecutionMode::Loopback,
            test_timeout: DEFAULT_TEST_TIMEOUT,
        }
    }

    /// Read the run configuration from the environment:
    /// `SIGNALING_CROSS_INSTANCE`, `SIGNALING_ROLE`, `SIGNALING_RELAY_URL`,
    /// `SIGNALING_TEST_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, SignalError> {
        let cross = std::env::var("SIGNALING_CROSS_INSTANCE")
            .map(|raw| raw == "1" || raw.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let role = match std::env::var("SIGNALING_ROLE") {
            Ok(raw) => {
                let index: u8 = raw
                    .parse()
                    .map_err(|_| SignalError::Setup(format!("invalid SIGNALING_ROLE: {raw}")))?;
                Role::from_index(index)?
            }
            Err(_) => Role::Offerer,
        };
        let test_timeout = match std::env::var("SIGNALING_TEST_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    SignalError::Setup(format!("invalid SIGNALING_TEST_TIMEOUT_SECS: {raw}"))
                })?;
                Duration::from_secs(secs)
            }
            Err(_) => DEFAULT_TEST_TIMEOUT,
        };
        let mut builder = Self::builder()
            .role(role)
            .mode(if cross {
                ExecutionMode::CrossInstance
            } else {
                ExecutionMode::Loopback
            })
            .test_timeout(test_timeout);
        if let Ok(relay_url) = std::env::var("SIGNALING_RELAY_URL") {
            builder = builder.relay_url(relay_url);
        }
        builder.build()
    }

    /// Signaling endpoint for one test: `<base>/<testIndex>/<role>`.
    pub fn signaling_url(&self, test_index: u32) -> Result<String, SignalError> {
        let base = self.relay_base()?;
        Ok(format!("{base}/{test_index}/{}", self.role.index()))
    }

    /// One-time reachability endpoint: `<base>/are-you-there/<role>`.
    pub fn rendezvous_url(&self) -> Result<String, SignalError> {
        let base = self.relay_base()?;
        Ok(format!("{base}/are-you-there/{}", self.role.index()))
    }

    /// Normalize the configured relay URL to a `ws`/`wss` base with no
    /// trailing slash.
    fn relay_base(&self) -> Result<String, SignalError> {
        let raw = self.relay_url.as_deref().ok_or_else(|| {
            SignalError::Setup("relay url is required in cross-instance mode".into())
        })?;
        let mut url = Url::parse(raw)
            .map_err(|err| SignalError::Setup(format!("invalid relay url {raw}: {err}")))?;
        let scheme = match url.scheme() {
            "ws" | "wss" => None,
            "http" => Some("ws"),
            "https" => Some("wss"),
            other => {
                return Err(SignalError::Setup(format!(
                    "unsupported relay url scheme: {other}"
                )));
            }
        };
        if let Some(scheme) = scheme {
            url.set_scheme(scheme)
                .map_err(|_| SignalError::Setup("invalid relay url scheme".into()))?;
        }
        let mut base = url.to_string();
        while base.ends_with('/') {
            base.pop();
        }
        Ok(base)
    }
}

/// Builder for [`HarnessConfig`].
pub struct HarnessConfigBuilder {
    relay_url: Option<String>,
    role: Option<Role>,
    mode: Option<ExecutionMode>,
    test_timeout: Option<Duration>,
}

impl HarnessConfigBuilder {
    pub fn new() -> Self {
        Self {
            relay_url: None,
            role: None,
            mode: None,
            test_timeout: None,
        }
    }

    pub fn relay_url(mut self, relay_url: impl Into<String>) -> Self {
        self.relay_url = Some(relay_url.into());
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn test_timeout(mut self, test_timeout: Duration) -> Self {
        self.test_timeout = Some(test_timeout);
        self
    }

    pub fn build(self) -> Result<HarnessConfig, SignalError> {
        let mode = self.mode.unwrap_or(ExecutionMode::Loopback);
        if mode == ExecutionMode::CrossInstance && self.relay_url.is_none() {
            return Err(SignalError::Setup(
                "relay url is required in cross-instance mode".into(),
            ));
        }
        Ok(HarnessConfig {
            relay_url: self.relay_url,
            role: self.role.unwrap_or(Role::Offerer),
            mode,
            test_timeout: self.test_timeout.unwrap_or(DEFAULT_TEST_TIMEOUT),
        })
    }
}

impl Default for HarnessConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
