use crate::api::{ApiError, EksApi, SdkEksClient, SdkStsClient, StsApi};
use crate::arn::Arn;
use crate::endpoint::{detect_eks, dial_address, normalize_endpoint};
use crate::error::{EksDetectorError, Result};
use crate::kubernetes::{KubeConfig, KubeConfigError};
use crate::tls::{self, certificate_dns_names, TlsConnection};
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, SdkConfig};
use opentelemetry::{otel_debug, otel_info, otel_warn, KeyValue};
use opentelemetry_sdk::resource::ResourceDetector;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions as semconv;
use std::io;
use std::thread;
use std::time::Duration;

const DEFAULT_IDENTITY_TIMEOUT: Duration = Duration::from_millis(500);
const DEFAULT_LIST_CLUSTERS_PAGE_SIZE: i32 = 20;

const GET_CALLER_IDENTITY: &str = "sts:GetCallerIdentity";
const LIST_CLUSTERS: &str = "eks:ListClusters";
const DESCRIBE_CLUSTER: &str = "eks:DescribeCluster";

/// Everything the detector needs from the outside world.
#[async_trait]
pub(crate) trait DetectorUtils: Send + Sync {
    fn in_cluster_config(&self) -> std::result::Result<KubeConfig, KubeConfigError>;

    async fn dial(&self, address: &str, config: &KubeConfig) -> Result<Box<dyn TlsConnection>>;

    async fn load_aws_config(&self) -> Result<SdkConfig>;

    fn sts_client(&self, config: &SdkConfig) -> Box<dyn StsApi>;

    fn eks_client(&self, config: &SdkConfig) -> Box<dyn EksApi>;
}

struct EksDetectorUtils;

#[async_trait]
impl DetectorUtils for EksDetectorUtils {
    fn in_cluster_config(&self) -> std::result::Result<KubeConfig, KubeConfigError> {
        KubeConfig::in_cluster()
    }

    async fn dial(&self, address: &str, config: &KubeConfig) -> Result<Box<dyn TlsConnection>> {
        let tls_config = tls::tls_config_for(config)?;
        tls::dial(address, tls_config).await
    }

    async fn load_aws_config(&self) -> Result<SdkConfig> {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .retry_config(RetryConfig::disabled())
            .load()
            .await;

        if config.credentials_provider().is_none() {
            return Err(EksDetectorError::AwsConfig(
                "no credentials provider configured".to_string(),
            ));
        }

        Ok(config)
    }

    fn sts_client(&self, config: &SdkConfig) -> Box<dyn StsApi> {
        Box::new(SdkStsClient(aws_sdk_sts::Client::new(config)))
    }

    fn eks_client(&self, config: &SdkConfig) -> Box<dyn EksApi> {
        Box::new(SdkEksClient(aws_sdk_eks::Client::new(config)))
    }
}

/// Resource detector that collects resource information from AWS EKS.
///
/// Detection runs in steps, each of which may end it early:
///
/// 1. Load the in-cluster Kubernetes configuration. Outside a cluster the
///    detected resource is empty.
/// 2. Open a TLS connection to the API server and collect the DNS names of
///    its certificates.
/// 3. Look for an EKS endpoint among those names. A cluster that is not EKS
///    yields an empty resource. Otherwise `cloud.provider`, `cloud.platform`
///    and `cloud.region` are known.
/// 4. Resolve `cloud.account.id` with `sts:GetCallerIdentity`. If that takes
///    longer than the identity timeout, detection stops with what it has.
/// 5. Resolve `k8s.cluster.name` by listing the visible EKS clusters and
///    matching their endpoints. Permission errors leave it unset.
///
/// Use [`EksResourceDetector::try_detect`] to observe errors; the
/// [`ResourceDetector`] implementation logs them and returns an empty resource.
pub struct EksResourceDetector {
    utils: Box<dyn DetectorUtils>,
    identity_timeout: Duration,
    list_clusters_page_size: i32,
}

impl EksResourceDetector {
    /// Creates a detector with the default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Returns a builder to customize the detector.
    pub fn builder() -> EksResourceDetectorBuilder {
        EksResourceDetectorBuilder::default()
    }

    /// Detects the EKS resource.
    ///
    /// An empty resource means the process does not run on EKS. Dropping the
    /// returned future cancels any AWS call in flight.
    pub async fn try_detect(&self) -> Result<Resource> {
        let k8s_config = match self.utils.in_cluster_config() {
            Ok(config) => config,
            Err(KubeConfigError::NotInCluster) => {
                otel_debug!(name: "EksResourceDetector.NotInCluster");
                return Ok(empty_resource());
            }
            Err(err) => return Err(EksDetectorError::KubernetesConfig(err)),
        };

        let names = self.kubernetes_certificate_dns_names(&k8s_config).await?;

        let Some(endpoint) = detect_eks(&names) else {
            otel_debug!(name: "EksResourceDetector.NotEks", dns_names = names.len() as i64);
            return Ok(empty_resource());
        };

        let mut attributes = vec![
            KeyValue::new(semconv::resource::CLOUD_PROVIDER, "aws"),
            KeyValue::new(semconv::resource::CLOUD_PLATFORM, "aws_eks"),
            KeyValue::new(semconv::resource::CLOUD_REGION, endpoint.region),
        ];

        let aws_config = self.utils.load_aws_config().await?;

        let sts_client = self.utils.sts_client(&aws_config);
        let Some(account_id) = self.account_id(sts_client.as_ref()).await? else {
            otel_info!(
                name: "EksResourceDetector.IdentityTimeout",
                timeout_ms = self.identity_timeout.as_millis() as i64
            );
            return Ok(resource(attributes));
        };
        attributes.push(KeyValue::new(semconv::resource::CLOUD_ACCOUNT_ID, account_id));

        let eks_client = self.utils.eks_client(&aws_config);
        if let Some(cluster_name) = self
            .find_cluster_by_endpoint(eks_client.as_ref(), &endpoint.host)
            .await?
        {
            attributes.push(KeyValue::new(semconv::resource::K8S_CLUSTER_NAME, cluster_name));
        }

        Ok(resource(attributes))
    }

    async fn kubernetes_certificate_dns_names(&self, config: &KubeConfig) -> Result<Vec<String>> {
        let address = dial_address(&config.host);
        let conn = self.utils.dial(&address, config).await?;

        let names = certificate_dns_names(conn.peer_certificates());
        // Closing writes close_notify on a blocking socket.
        let closed = match tokio::task::spawn_blocking(move || conn.close()).await {
            Ok(closed) => closed,
            Err(err) => Err(io::Error::other(err)),
        }
        .map_err(EksDetectorError::Close);

        // First failure wins; a close error only replaces a successful read.
        names.and_then(|names| closed.map(|()| names))
    }

    /// `None` when the identity check ran out of time.
    async fn account_id(&self, client: &dyn StsApi) -> Result<Option<String>> {
        let arn = match tokio::time::timeout(self.identity_timeout, client.get_caller_identity()).await
        {
            Ok(arn) => arn.map_err(|source| EksDetectorError::Api {
                operation: GET_CALLER_IDENTITY,
                source,
            })?,
            Err(_elapsed) => return Ok(None),
        };

        Ok(Some(Arn::parse(&arn)?.account_id.to_string()))
    }

    async fn find_cluster_by_endpoint(
        &self,
        client: &dyn EksApi,
        endpoint: &str,
    ) -> Result<Option<String>> {
        let clusters = match list_clusters(client, self.list_clusters_page_size).await {
            Ok(clusters) => clusters,
            Err(err) if err.is_access_denied() => {
                otel_debug!(name: "EksResourceDetector.ListClustersDenied");
                return Ok(None);
            }
            Err(source) => {
                return Err(EksDetectorError::Api {
                    operation: LIST_CLUSTERS,
                    source,
                })
            }
        };

        if clusters.len() == 1 {
            return Ok(clusters.into_iter().next());
        }

        for cluster in clusters {
            let cluster_endpoint = match client.describe_cluster_endpoint(&cluster).await {
                Ok(cluster_endpoint) => cluster_endpoint,
                Err(err) if err.is_access_denied() => {
                    otel_debug!(
                        name: "EksResourceDetector.DescribeClusterDenied",
                        cluster = cluster.as_str()
                    );
                    continue;
                }
                Err(source) => {
                    return Err(EksDetectorError::Api {
                        operation: DESCRIBE_CLUSTER,
                        source,
                    })
                }
            };

            if cluster_endpoint.is_some_and(|ep| normalize_endpoint(&ep) == endpoint) {
                return Ok(Some(cluster));
            }
        }

        Ok(None)
    }
}

async fn list_clusters(
    client: &dyn EksApi,
    page_size: i32,
) -> std::result::Result<Vec<String>, ApiError> {
    let mut clusters = Vec::new();
    let mut next_token = None;

    loop {
        let page = client.list_clusters(next_token.take(), page_size).await?;
        clusters.extend(page.clusters);

        match page.next_token.filter(|token| !token.is_empty()) {
            Some(token) => next_token = Some(token),
            None => return Ok(clusters),
        }
    }
}

fn empty_resource() -> Resource {
    Resource::builder_empty().build()
}

fn resource(attributes: Vec<KeyValue>) -> Resource {
    Resource::builder_empty()
        .with_attributes(attributes)
        .build()
}

impl Default for EksResourceDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceDetector for EksResourceDetector {
    fn detect(&self) -> Resource {
        // A dedicated thread keeps this usable from inside an async runtime.
        let outcome = thread::scope(|scope| {
            scope
                .spawn(|| {
                    let runtime = tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .map_err(EksDetectorError::Runtime)?;
                    runtime.block_on(self.try_detect())
                })
                .join()
        });

        match outcome {
            Ok(Ok(resource)) => resource,
            Ok(Err(err)) => {
                otel_warn!(
                    name: "EksResourceDetector.DetectFailed",
                    error = format!("{err}")
                );
                empty_resource()
            }
            Err(_) => {
                otel_warn!(name: "EksResourceDetector.DetectPanicked");
                empty_resource()
            }
        }
    }
}

/// Builder for [`EksResourceDetector`].
#[derive(Debug, Clone)]
pub struct EksResourceDetectorBuilder {
    identity_timeout: Duration,
    list_clusters_page_size: i32,
}

impl Default for EksResourceDetectorBuilder {
    fn default() -> Self {
        EksResourceDetectorBuilder {
            identity_timeout: DEFAULT_IDENTITY_TIMEOUT,
            list_clusters_page_size: DEFAULT_LIST_CLUSTERS_PAGE_SIZE,
        }
    }
}

impl EksResourceDetectorBuilder {
    /// Time budget for `sts:GetCallerIdentity`. Defaults to 500ms.
    pub fn with_identity_timeout(mut self, timeout: Duration) -> Self {
        self.identity_timeout = timeout;
        self
    }

    /// Page size used with `eks:ListClusters`. Defaults to 20.
    pub fn with_list_clusters_page_size(mut self, page_size: i32) -> Self {
        self.list_clusters_page_size = page_size;
        self
    }

    /// Builds the detector.
    pub fn build(self) -> EksResourceDetector {
        self.build_with_utils(Box::new(EksDetectorUtils))
    }

    pub(crate) fn build_with_utils(self, utils: Box<dyn DetectorUtils>) -> EksResourceDetector {
        EksResourceDetector {
            utils,
            identity_timeout: self.identity_timeout,
            list_clusters_page_size: self.list_clusters_page_size,
        }
    }
}
