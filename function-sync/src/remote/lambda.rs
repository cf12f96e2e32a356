//! AWS Lambda implementation of [`FunctionClient`].

use super::{
    is_auth_code, FunctionClient, PackageDownloader, RemoteFailure, UploadOutcome, CONFLICT_CODE,
    CREDENTIALS_CODE,
};
use crate::config::RemoteConfig;
use crate::utils::{Result, SyncError};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::error::CredentialsError;
use aws_sdk_lambda::config::Region;
use aws_sdk_lambda::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_lambda::primitives::Blob;
use bytes::Bytes;
use std::error::Error as StdError;
use std::time::Duration;
use tracing::{debug, info};

pub struct LambdaClient {
    client: aws_sdk_lambda::Client,
    downloader: PackageDownloader,
}

impl LambdaClient {
    /// Resolve credentials for the configured profile and build the client.
    pub async fn connect(settings: &RemoteConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(profile) = &settings.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        let Some(region) = sdk_config.region() else {
            return Err(SyncError::Config(
                "no region configured for the remote service (set remote.region or the profile's region)"
                    .to_string(),
            ));
        };

        info!(
            "Using remote service in region {} (profile: {})",
            region,
            settings.profile.as_deref().unwrap_or("default")
        );

        Ok(Self {
            client: aws_sdk_lambda::Client::new(&sdk_config),
            downloader: PackageDownloader::new(Duration::from_secs(settings.download_timeout_secs))?,
        })
    }
}

#[async_trait]
impl FunctionClient for LambdaClient {
    async fn fetch_package_location(&self, function_identifier: &str) -> Result<String> {
        let output = self
            .client
            .get_function()
            .function_name(function_identifier)
            .send()
            .await
            .map_err(|err| {
                let not_found = err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception());
                if not_found {
                    SyncError::NotFound(function_identifier.to_string())
                } else {
                    classify_request_error(&err)
                }
            })?;

        output
            .code()
            .and_then(|code| code.location())
            .map(str::to_owned)
            .ok_or_else(|| {
                SyncError::NotFound(format!("{function_identifier} has no downloadable package"))
            })
    }

    async fn download(&self, url: &str) -> Result<Bytes> {
        self.downloader.download(url).await
    }

    async fn push_package(&self, function_identifier: &str, package: Vec<u8>) -> UploadOutcome {
        debug!("Pushing {} byte package to {}", package.len(), function_identifier);

        let result = self
            .client
            .update_function_code()
            .function_name(function_identifier)
            .zip_file(Blob::new(package))
            .send()
            .await;

        match result {
            Ok(output) => UploadOutcome::Success {
                detail: Some(format!(
                    "code size {} bytes, revision {}",
                    output.code_size(),
                    output.revision_id().unwrap_or("-")
                )),
            },
            Err(SdkError::ServiceError(service)) => {
                let err = service.err();
                outcome_for_service_error(err.code(), err.message())
            }
            Err(err) if caused_by_credentials(&err) => UploadOutcome::Failure(RemoteFailure {
                code: CREDENTIALS_CODE.to_string(),
                message: DisplayErrorContext(&err).to_string(),
                retryable: false,
            }),
            Err(err @ (SdkError::TimeoutError(_) | SdkError::DispatchFailure(_))) => {
                UploadOutcome::network_failure(DisplayErrorContext(&err).to_string())
            }
            Err(err) => UploadOutcome::Failure(RemoteFailure {
                code: "ClientError".to_string(),
                message: DisplayErrorContext(&err).to_string(),
                retryable: false,
            }),
        }
    }
}

/// Map a provider-reported push error onto an outcome.
fn outcome_for_service_error(code: Option<&str>, message: Option<&str>) -> UploadOutcome {
    let message = message.map(str::to_owned);
    match code {
        Some(CONFLICT_CODE) => UploadOutcome::Conflict { detail: message },
        code => UploadOutcome::Failure(RemoteFailure {
            code: code.unwrap_or("Unknown").to_string(),
            message: message.unwrap_or_default(),
            retryable: false,
        }),
    }
}

/// True when credential resolution failed somewhere in the error's source chain.
fn caused_by_credentials(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<CredentialsError>() {
            return true;
        }
        current = e.source();
    }
    false
}

fn classify_request_error<E, R>(err: &SdkError<E, R>) -> SyncError
where
    E: ProvideErrorMetadata + StdError + 'static,
    R: std::fmt::Debug + 'static,
{
    let context = DisplayErrorContext(err).to_string();
    match err {
        SdkError::ServiceError(service) => {
            let inner = service.err();
            if is_auth_code(inner.code()) {
                SyncError::Authentication(context)
            } else {
                SyncError::Remote {
                    code: inner.code().unwrap_or("Unknown").to_string(),
                    message: inner.message().unwrap_or_default().to_string(),
                }
            }
        }
        // Credential resolution happens before dispatch and surfaces as a client-side failure.
        _ if caused_by_credentials(err) => SyncError::Authentication(context),
        _ => SyncError::Network(context),
    }
}
