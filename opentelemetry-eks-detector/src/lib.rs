//! AWS EKS resource detection for OpenTelemetry.
//!
//! [`EksResourceDetector`] recognizes an EKS cluster from the certificate
//! its Kubernetes API server presents, then asks AWS for the account and
//! cluster name. It fills in:
//!
//! - `cloud.provider` (`aws`)
//! - `cloud.platform` (`aws_eks`)
//! - `cloud.region`
//! - `cloud.account.id`, when the caller identity resolves in time
//! - `k8s.cluster.name`, when the cluster can be listed and matched
//!
//! # Example
//!
//! ```no_run
//! use opentelemetry_eks_detector::EksResourceDetector;
//!
//! # async fn run() -> Result<(), opentelemetry_eks_detector::EksDetectorError> {
//! let resource = EksResourceDetector::new().try_detect().await?;
//! if resource.is_empty() {
//!     // Not running on EKS.
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The detector also implements
//! [`ResourceDetector`](opentelemetry_sdk::resource::ResourceDetector) so it
//! can be handed to `Resource::builder().with_detector(..)`; in that form
//! errors are logged and an empty resource is returned.
#![cfg_attr(docsrs, feature(doc_cfg))]

mod api;
mod arn;
mod detector;
mod endpoint;
mod error;
mod kubernetes;
mod tls;

pub use api::ApiError;
pub use arn::{Arn, ArnError};
pub use detector::{EksResourceDetector, EksResourceDetectorBuilder};
pub use error::EksDetectorError;
pub use kubernetes::{KubeConfig, KubeConfigError};
