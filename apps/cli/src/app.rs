//! Wiring from configuration to a ready [`RotationService`].

use anyhow::Context;
use rotator_credential::notify::LogNotifier;
use rotator_credential::password::PasswordPolicy;
use rotator_credential::remote::HttpAccountClient;
use rotator_credential::rotation::{RotationOrchestrator, RotationPolicy, RotationService};
use rotator_credential::store::{CredentialStore, FileCredentialStore};
use rotator_credential::{AccountCredential, HistoryStore, RotatorConfig};
use std::sync::Arc;

/// Load the credential and run every check that needs it.
pub fn load_credential(
    config: &RotatorConfig,
) -> anyhow::Result<(Arc<FileCredentialStore>, AccountCredential)> {
    let store = Arc::new(FileCredentialStore::new(&config.account.credential_file));
    let credential = store.load().context("failed to load the account credential")?;
    config.preflight(&credential)?;
    Ok((store, credential))
}

/// Everything a rotation, resolution or connection test needs.
pub fn build_service(config: &RotatorConfig) -> anyhow::Result<Arc<RotationService>> {
    let (store, credential) = load_credential(config)?;

    let history = Arc::new(
        HistoryStore::open(&config.history.path, config.history.max_records)
            .context("failed to open the rotation history")?,
    );
    let remote = Arc::new(
        HttpAccountClient::new(&config.remote).context("failed to build the HTTP client")?,
    );
    let passwords = Arc::new(PasswordPolicy::new(config.password.clone())?);

    let orchestrator = RotationOrchestrator::new(
        remote,
        history,
        passwords,
        store,
        RotationPolicy::from_config(config),
    )
    .with_notifier(Arc::new(LogNotifier::new(config.notifications.clone())));

    tracing::debug!(
        login = %credential.login,
        history = %config.history.path.display(),
        remote = %config.remote.base_url,
        "Rotation service ready"
    );

    Ok(Arc::new(
        RotationService::new(orchestrator, credential)
            .with_busy_grace(config.rotation.busy_grace)
            .with_failure_retry_delay(config.rotation.failure_retry_delay),
    ))
}
