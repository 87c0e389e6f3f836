use crate::api::ApiError;
use crate::arn::ArnError;
use crate::kubernetes::KubeConfigError;
use std::io;
use thiserror::Error;

/// Errors that abort EKS detection.
///
/// Outcomes that only mean "not running on EKS" (no cluster, a non-EKS
/// cluster, a slow identity check, denied cluster listing) are not errors;
/// they produce an empty or partial resource instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EksDetectorError {
    /// The in-cluster Kubernetes configuration could not be loaded.
    #[error("error getting Kubernetes config: {0}")]
    KubernetesConfig(#[source] KubeConfigError),

    /// The TLS client configuration could not be built.
    #[error("error building TLS config: {0}")]
    TlsConfig(#[from] rustls::Error),

    /// Connecting to the Kubernetes API server failed.
    #[error("error dialing {address}: {source}")]
    Dial {
        /// Address that was dialed.
        address: String,
        /// Underlying transport error.
        #[source]
        source: io::Error,
    },

    /// Closing the connection to the Kubernetes API server failed.
    #[error("error closing connection: {0}")]
    Close(#[source] io::Error),

    /// A peer certificate could not be parsed.
    #[error("error parsing peer certificate: {0}")]
    Certificate(String),

    /// The AWS SDK configuration could not be loaded.
    #[error("unable to load AWS config: {0}")]
    AwsConfig(String),

    /// An AWS API call failed.
    #[error("error issuing `{operation}`: {source}")]
    Api {
        /// The failing operation, e.g. `sts:GetCallerIdentity`.
        operation: &'static str,
        /// Underlying API error.
        #[source]
        source: ApiError,
    },

    /// The caller identity ARN is malformed.
    #[error("error parsing ARN: {0}")]
    Arn(#[from] ArnError),

    /// The runtime driving a blocking detection could not be started.
    #[error("error starting detection runtime: {0}")]
    Runtime(#[source] io::Error),
}

pub(crate) type Result<T> = std::result::Result<T, EksDetectorError>;
