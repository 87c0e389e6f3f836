//! In-cluster Kubernetes configuration.
//!
//! Mirrors how client libraries locate the API server from inside a pod: the
//! service host and port come from the environment Kubernetes injects, and
//! the token and cluster CA from the mounted service account.
use opentelemetry::{otel_debug, otel_warn};
use rustls_pki_types::CertificateDer;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;
use std::{env, fmt};
use thiserror::Error;

pub(crate) const SERVICE_HOST_ENV_VAR: &str = "KUBERNETES_SERVICE_HOST";
pub(crate) const SERVICE_PORT_ENV_VAR: &str = "KUBERNETES_SERVICE_PORT";
const TOKEN_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
const ROOT_CA_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Errors produced while loading the in-cluster configuration.
#[derive(Debug, Error)]
pub enum KubeConfigError {
    /// The process does not run inside a Kubernetes cluster.
    #[error(
        "unable to load in-cluster configuration, KUBERNETES_SERVICE_HOST and KUBERNETES_SERVICE_PORT must be defined"
    )]
    NotInCluster,

    /// A configuration file could not be read.
    #[error("error reading {path}: {source}")]
    Io {
        /// File that failed to load.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Location of the Kubernetes API server and the roots to trust it with.
#[derive(Clone)]
pub struct KubeConfig {
    /// API server URL, e.g. `https://10.100.0.1:443`.
    pub host: String,
    /// Service account token of the pod.
    pub bearer_token: String,
    /// Trusted CA certificates. Empty means "use the system roots".
    pub root_certificates: Vec<CertificateDer<'static>>,
}

impl fmt::Debug for KubeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeConfig")
            .field("host", &self.host)
            .field("bearer_token", &"<redacted>")
            .field("root_certificates", &self.root_certificates.len())
            .finish()
    }
}

impl KubeConfig {
    /// Loads the configuration of the cluster this process runs in.
    ///
    /// Returns [`KubeConfigError::NotInCluster`] when the service environment
    /// variables are missing, and [`KubeConfigError::Io`] when the service
    /// account token cannot be read.
    pub fn in_cluster() -> Result<Self, KubeConfigError> {
        Self::from_parts(
            env::var(SERVICE_HOST_ENV_VAR).ok(),
            env::var(SERVICE_PORT_ENV_VAR).ok(),
            Path::new(TOKEN_FILE),
            Path::new(ROOT_CA_FILE),
        )
    }

    pub(crate) fn from_parts(
        host: Option<String>,
        port: Option<String>,
        token_file: &Path,
        root_ca_file: &Path,
    ) -> Result<Self, KubeConfigError> {
        let (Some(host), Some(port)) = (
            host.filter(|h| !h.is_empty()),
            port.filter(|p| !p.is_empty()),
        ) else {
            return Err(KubeConfigError::NotInCluster);
        };

        let bearer_token = fs::read_to_string(token_file).map_err(|source| KubeConfigError::Io {
            path: token_file.display().to_string(),
            source,
        })?;

        let root_certificates = match load_certificates(root_ca_file) {
            Ok(certs) => certs,
            Err(err) => {
                otel_warn!(
                    name: "KubeConfig.RootCaLoadFailed",
                    message = "Falling back to system roots",
                    error = format!("{err}")
                );
                Vec::new()
            }
        };

        otel_debug!(
            name: "KubeConfig.Loaded",
            host = host.as_str(),
            root_certificates = root_certificates.len() as i64
        );

        Ok(KubeConfig {
            host: format!("https://{}", join_host_port(&host, &port)),
            bearer_token: bearer_token.trim().to_string(),
            root_certificates,
        })
    }
}

fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

pub(crate) fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, KubeConfigError> {
    let io_error = |source| KubeConfigError::Io {
        path: path.display().to_string(),
        source,
    };

    let mut reader = BufReader::new(File::open(path).map_err(io_error)?);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_error)?;

    if certs.is_empty() {
        return Err(io_error(io::Error::new(
            io::ErrorKind::InvalidData,
            "no PEM certificates found",
        )));
    }

    Ok(certs)
}
