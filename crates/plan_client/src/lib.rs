use std::time::Duration;

use url::Url;

pub mod builder;
mod session;
pub mod transport;
pub mod validator;

pub use builder::{build, PlanRequest};
pub use session::{PlanSession, SubmitOutcome, Subscription, CANCELLED_MESSAGE};
pub use transport::{
    send_with_deadline, HttpTransport, PlanTransport, RawResponse, DEFAULT_TIMEOUT,
};
pub use validator::validate;

/// Where and how long a [`PlanSession`] talks to the plan service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoint: Url,
    pub timeout: Duration,
    pub confirm_endpoint: Option<Url>,
}

impl ClientConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            timeout: DEFAULT_TIMEOUT,
            confirm_endpoint: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_confirm_endpoint(mut self, confirm_endpoint: Url) -> Self {
        self.confirm_endpoint = Some(confirm_endpoint);
        self
    }
}
