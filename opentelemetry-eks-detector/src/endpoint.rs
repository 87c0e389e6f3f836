use std::sync::LazyLock;

use regex::Regex;

const HTTPS_SCHEME: &str = "https://";

// Commercial, `api.aws` and China partition endpoint domains.
static EKS_ENDPOINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\.(?P<region>[^.]+)\.(?:eks\.amazonaws\.com|api\.aws|(?:api\.)?amazonwebservices\.com\.cn)$",
    )
    .expect("EKS endpoint pattern is valid")
});

/// An EKS API server hostname found among the certificate DNS names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EksEndpoint {
    /// Lowercased hostname, comparable with [`normalize_endpoint`] output.
    pub(crate) host: String,
    pub(crate) region: String,
}

/// Returns the first name that looks like an EKS API server endpoint.
pub(crate) fn detect_eks<I, S>(names: I) -> Option<EksEndpoint>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names.into_iter().find_map(|name| match_endpoint(name.as_ref()))
}

pub(crate) fn match_endpoint(name: &str) -> Option<EksEndpoint> {
    let captures = EKS_ENDPOINT.captures(name)?;
    Some(EksEndpoint {
        host: name.to_ascii_lowercase(),
        region: captures["region"].to_string(),
    })
}

/// Lowercases an endpoint URL and drops its `https://` scheme.
pub(crate) fn normalize_endpoint(endpoint: &str) -> String {
    let lower = endpoint.to_ascii_lowercase();
    match lower.strip_prefix(HTTPS_SCHEME) {
        Some(host) => host.to_string(),
        None => lower,
    }
}

/// Address to dial for a Kubernetes host, defaulting to the HTTPS port.
pub(crate) fn dial_address(host: &str) -> String {
    let address = host.strip_prefix(HTTPS_SCHEME).unwrap_or(host);
    let address = address.trim_end_matches('/');
    if split_host_port(address).1.is_some() {
        address.to_string()
    } else if address.contains(':') && !address.starts_with('[') {
        format!("[{address}]:443")
    } else {
        format!("{address}:443")
    }
}

/// Splits `host:port`, `[v6]:port`, `host` or `[v6]` into its parts.
pub(crate) fn split_host_port(address: &str) -> (&str, Option<&str>) {
    if let Some(rest) = address.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((host, tail)) => (host, tail.strip_prefix(':')),
            None => (address, None),
        };
    }

    match address.split_once(':') {
        Some((host, port)) if !port.contains(':') => (host, Some(port)),
        _ => (address, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_endpoint_domains() {
        for (name, region) in [
            ("abc123.eu-west-1.eks.amazonaws.com", "eu-west-1"),
            ("abc123.gr7.us-east-2.eks.amazonaws.com", "us-east-2"),
            ("abc123.us-west-2.api.aws", "us-west-2"),
            ("abc123.cn-north-1.amazonwebservices.com.cn", "cn-north-1"),
            ("abc123.cn-northwest-1.api.amazonwebservices.com.cn", "cn-northwest-1"),
        ] {
            let endpoint = match_endpoint(name).unwrap_or_else(|| panic!("{name} should match"));
            assert_eq!(endpoint.region, region);
            assert_eq!(endpoint.host, name);
        }
    }

    #[test]
    fn match_endpoint_rejects_other_names() {
        for name in [
            "kubernetes",
            "kubernetes.default.svc.cluster.local",
            "eks.amazonaws.com",
            "abc.eu-west-1.eks.amazonaws.com.evil.example",
            "abc.eu-west-1.compute.amazonaws.com",
        ] {
            assert_eq!(match_endpoint(name), None, "{name} should not match");
        }
    }

    #[test]
    fn detect_eks_first_match_wins() {
        let names = [
            "kubernetes",
            "ABC.eu-west-1.eks.amazonaws.com",
            "def.us-east-1.eks.amazonaws.com",
        ];
        assert_eq!(
            detect_eks(names),
            Some(EksEndpoint {
                host: "abc.eu-west-1.eks.amazonaws.com".to_string(),
                region: "eu-west-1".to_string(),
            })
        );
        assert_eq!(detect_eks(["kubernetes", "kubernetes.default"]), None);
        assert_eq!(detect_eks(Vec::<String>::new()), None);
    }

    #[test]
    fn normalize_endpoint_is_case_and_scheme_insensitive() {
        assert_eq!(
            normalize_endpoint("https://ABC.example.eks.amazonaws.com"),
            match_endpoint("abc.example.eks.amazonaws.com").unwrap().host
        );
        assert_eq!(normalize_endpoint("HTTPS://Abc.Example"), "abc.example");
        assert_eq!(normalize_endpoint("abc.example"), "abc.example");
    }

    #[test]
    fn dial_address_defaults_port() {
        assert_eq!(dial_address("https://192.0.2.1:443"), "192.0.2.1:443");
        assert_eq!(dial_address("https://10.100.0.1"), "10.100.0.1:443");
        assert_eq!(dial_address("kubernetes.default.svc:6443"), "kubernetes.default.svc:6443");
        assert_eq!(dial_address("https://[fd00::1]:443"), "[fd00::1]:443");
        assert_eq!(dial_address("https://[fd00::1]"), "[fd00::1]:443");
        assert_eq!(dial_address("fd00::1"), "[fd00::1]:443");
    }

    #[test]
    fn split_host_port_variants() {
        assert_eq!(split_host_port("192.0.2.1:443"), ("192.0.2.1", Some("443")));
        assert_eq!(split_host_port("[fd00::1]:6443"), ("fd00::1", Some("6443")));
        assert_eq!(split_host_port("[fd00::1]"), ("fd00::1", None));
        assert_eq!(split_host_port("example.com"), ("example.com", None));
        assert_eq!(split_host_port("fd00::1"), ("fd00::1", None));
    }
}
