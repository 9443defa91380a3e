mod auth;
mod entries;
mod helpers;
mod month;
mod profile;
mod sync;

use anyhow::Result;
use std::sync::Arc;

use larder_core::api::ApiClient;
use larder_core::auth::{AuthFlow, OUT_OF_BAND};
use larder_core::tokens::TokenStore;
use larder_core::transport::HttpTransport;
use larder_core::verifier::VerifierSource;

use crate::callback::{CallbackVerifier, ManualVerifier};
use crate::config::Config;
use crate::http::ReqwestTransport;

pub(crate) use auth::{cmd_auth_login, cmd_auth_logout, cmd_auth_status};
pub(crate) use entries::{cmd_entries, cmd_history};
pub(crate) use month::cmd_month;
pub(crate) use profile::cmd_profile;
pub(crate) use sync::{SyncArgs, cmd_sync};

/// Build an API client wired to reqwest and the configured token file.
///
/// `manual` selects the out-of-band flow, where the user pastes the verifier
/// instead of the browser redirecting to the local callback listener.
pub(super) fn api_client(
    config: &Config,
    rt: &tokio::runtime::Handle,
    manual: bool,
) -> Result<ApiClient> {
    let credentials = config.credentials()?;
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(rt.clone())?);

    let (verifier, callback_url): (Box<dyn VerifierSource>, String) = if manual {
        (Box::new(ManualVerifier), OUT_OF_BAND.to_string())
    } else {
        (
            Box::new(CallbackVerifier::new(rt.clone(), config.callback_port)),
            config.callback_url(),
        )
    };

    let auth = AuthFlow::new(
        credentials,
        TokenStore::new(&config.tokens_path),
        transport.clone(),
        verifier,
    )
    .with_endpoints(config.endpoints.clone())
    .with_callback_url(callback_url);

    Ok(ApiClient::new(auth, transport))
}
