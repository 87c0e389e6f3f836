//! Narrow views of the AWS services the detector talks to.
use async_trait::async_trait;
use aws_sdk_eks::error::ProvideErrorMetadata;
use std::error::Error as StdError;
use std::fmt;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

const ACCESS_DENIED_EXCEPTION: &str = "AccessDeniedException";

/// Error returned by an AWS API call, keeping the service error code.
#[derive(Debug)]
pub struct ApiError {
    code: Option<String>,
    source: BoxError,
}

impl ApiError {
    #[cfg(test)]
    pub(crate) fn new(code: Option<&str>, source: impl Into<BoxError>) -> Self {
        ApiError {
            code: code.map(str::to_owned),
            source: source.into(),
        }
    }

    fn from_sdk<E>(err: E) -> Self
    where
        E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
    {
        ApiError {
            code: err.code().map(str::to_owned),
            source: Box::new(err),
        }
    }

    /// Service error code, e.g. `AccessDeniedException`.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Whether the caller lacks permission for the operation.
    pub fn is_access_denied(&self) -> bool {
        self.code() == Some(ACCESS_DENIED_EXCEPTION)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{code}: {}", self.source),
            None => write!(f, "{}", self.source),
        }
    }
}

impl StdError for ApiError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

/// One page of `eks:ListClusters`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ClusterPage {
    pub(crate) clusters: Vec<String>,
    pub(crate) next_token: Option<String>,
}

#[async_trait]
pub(crate) trait StsApi: Send + Sync {
    /// Returns the ARN of the calling identity.
    async fn get_caller_identity(&self) -> Result<String, ApiError>;
}

#[async_trait]
pub(crate) trait EksApi: Send + Sync {
    async fn list_clusters(
        &self,
        next_token: Option<String>,
        max_results: i32,
    ) -> Result<ClusterPage, ApiError>;

    /// Returns the API server endpoint of cluster `name`, if it has one.
    async fn describe_cluster_endpoint(&self, name: &str) -> Result<Option<String>, ApiError>;
}

pub(crate) struct SdkStsClient(pub(crate) aws_sdk_sts::Client);

#[async_trait]
impl StsApi for SdkStsClient {
    async fn get_caller_identity(&self) -> Result<String, ApiError> {
        let output = self
            .0
            .get_caller_identity()
            .send()
            .await
            .map_err(ApiError::from_sdk)?;

        Ok(output.arn.unwrap_or_default())
    }
}

pub(crate) struct SdkEksClient(pub(crate) aws_sdk_eks::Client);

#[async_trait]
impl EksApi for SdkEksClient {
    async fn list_clusters(
        &self,
        next_token: Option<String>,
        max_results: i32,
    ) -> Result<ClusterPage, ApiError> {
        let output = self
            .0
            .list_clusters()
            .max_results(max_results)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(ApiError::from_sdk)?;

        Ok(ClusterPage {
            clusters: output.clusters.unwrap_or_default(),
            next_token: output.next_token,
        })
    }

    async fn describe_cluster_endpoint(&self, name: &str) -> Result<Option<String>, ApiError> {
        let output = self
            .0
            .describe_cluster()
            .name(name)
            .send()
            .await
            .map_err(ApiError::from_sdk)?;

        Ok(output.cluster.and_then(|cluster| cluster.endpoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn access_denied_is_detected_by_code() {
        let denied = ApiError::new(
            Some("AccessDeniedException"),
            io::Error::other("not authorized to perform eks:DescribeCluster"),
        );
        assert!(denied.is_access_denied());
        assert_eq!(
            denied.to_string(),
            "AccessDeniedException: not authorized to perform eks:DescribeCluster"
        );

        let throttled = ApiError::new(Some("ThrottlingException"), io::Error::other("slow down"));
        assert!(!throttled.is_access_denied());

        let transport = ApiError::new(None, io::Error::other("connection reset"));
        assert!(!transport.is_access_denied());
        assert_eq!(transport.to_string(), "connection reset");
    }
}
