//! Handing the user's authorization back to the waiting handshake.
//!
//! A [`VerifierSlot`] holds at most one [`Authorization`]. The callback
//! listener resolves it through a [`VerifierResolver`]; the flow blocks on
//! [`VerifierSlot::wait`].

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/// What the user hands back after approving access.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Authorization {
    pub oauth_token: String,
    pub oauth_verifier: String,
}

impl Authorization {
    /// Extract the pair from a pasted callback URL or bare query string.
    #[must_use]
    pub fn from_callback_url(url: &str) -> Option<Self> {
        let query = url.split_once('?').map_or(url, |(_, q)| q);
        let query = query.split('#').next().unwrap_or_default();

        let mut token = None;
        let mut verifier = None;
        for pair in query.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = urlencoding::decode(value).ok()?.trim().to_string();
            match key {
                "oauth_token" => token = Some(value),
                "oauth_verifier" => verifier = Some(value),
                _ => {}
            }
        }

        match (token, verifier) {
            (Some(t), Some(v)) if !t.is_empty() && !v.is_empty() => Some(Self {
                oauth_token: t,
                oauth_verifier: v,
            }),
            _ => None,
        }
    }
}

/// The authorize step as presented to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeRequest {
    pub url: String,
    pub request_token: String,
}

/// Obtains the verifier out-of-band. Blocks until the user has approved
/// access or the source gives up.
pub trait VerifierSource {
    fn obtain(&self, request: &AuthorizeRequest) -> Result<Authorization>;
}

pub struct VerifierSlot {
    tx: SyncSender<Authorization>,
    rx: Receiver<Authorization>,
}

impl VerifierSlot {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::sync_channel(1);
        Self { tx, rx }
    }

    #[must_use]
    pub fn resolver(&self) -> VerifierResolver {
        VerifierResolver {
            tx: self.tx.clone(),
        }
    }

    /// Block until resolved or `timeout` elapses.
    #[must_use]
    pub fn wait(&self, timeout: Duration) -> Option<Authorization> {
        self.rx.recv_timeout(timeout).ok()
    }

    #[must_use]
    pub fn try_take(&self) -> Option<Authorization> {
        self.rx.try_recv().ok()
    }
}

impl Default for VerifierSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct VerifierResolver {
    tx: SyncSender<Authorization>,
}

impl VerifierResolver {
    /// Fill the slot. Returns false if it already holds a value or the
    /// waiting side is gone.
    pub fn resolve(&self, authorization: Authorization) -> bool {
        match self.tx.try_send(authorization) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
        }
    }
}
