//! CONTAINER resource detector
//!
//! Detect the container a process runs in from the variables an NRI runtime
//! plugin injects into the container environment.
use opentelemetry::KeyValue;
use opentelemetry_sdk::resource::ResourceDetector;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions as semconv;
use std::env;

/// Environment variable carrying the container ID.
pub const CONTAINER_ID_ENV_VAR: &str = "CONTAINER_ID";
/// Environment variable carrying the container runtime name.
pub const CONTAINER_RUNTIME_ENV_VAR: &str = "CONTAINER_RUNTIME";

const CONTAINER_RUNTIME: &str = "container.runtime";

/// Detect the container ID and container runtime.
///
/// Each attribute is only added when its variable is set to a non-empty
/// value. When neither is, the detected resource is empty.
pub struct ContainerResourceDetector {
    lookup_env: fn(&str) -> Option<String>,
}

impl ContainerResourceDetector {
    /// Creates a detector reading the process environment.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResourceDetector for ContainerResourceDetector {
    fn detect(&self) -> Resource {
        let lookup = |key: &str| (self.lookup_env)(key).filter(|value| !value.is_empty());

        let attributes: Vec<KeyValue> = [
            lookup(CONTAINER_ID_ENV_VAR)
                .map(|id| KeyValue::new(semconv::resource::CONTAINER_ID, id)),
            lookup(CONTAINER_RUNTIME_ENV_VAR)
                .map(|runtime| KeyValue::new(CONTAINER_RUNTIME, runtime)),
        ]
        .into_iter()
        .flatten()
        .collect();

        if attributes.is_empty() {
            return Resource::builder_empty().build();
        }

        Resource::builder_empty()
            .with_attributes(attributes)
            .build()
    }
}

fn lookup_env(key: &str) -> Option<String> {
    env::var(key).ok()
}

impl Default for ContainerResourceDetector {
    fn default() -> Self {
        Self { lookup_env }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::Key;

    #[test]
    fn test_container_detector() {
        temp_env::with_vars(
            [
                (CONTAINER_ID_ENV_VAR, Some("abc123")),
                (CONTAINER_RUNTIME_ENV_VAR, Some("containerd")),
            ],
            || {
                let expected = Resource::builder_empty()
                    .with_attributes([
                        KeyValue::new(semconv::resource::CONTAINER_ID, "abc123"),
                        KeyValue::new("container.runtime", "containerd"),
                    ])
                    .build();

                let got = ContainerResourceDetector::new().detect();

                assert_eq!(expected, got);
            },
        );
    }

    #[test]
    fn test_container_detector_returns_empty_if_unset() {
        temp_env::with_vars_unset([CONTAINER_ID_ENV_VAR, CONTAINER_RUNTIME_ENV_VAR], || {
            let got = ContainerResourceDetector::new().detect();
            assert_eq!(Resource::builder_empty().build(), got);
        });
    }

    #[test]
    fn test_container_detector_ignores_empty_values() {
        temp_env::with_vars(
            [
                (CONTAINER_ID_ENV_VAR, Some("")),
                (CONTAINER_RUNTIME_ENV_VAR, Some("cri-o")),
            ],
            || {
                let resource = ContainerResourceDetector::new().detect();
                assert_eq!(resource.len(), 1);
                assert!(resource
                    .get(&Key::from_static_str(semconv::resource::CONTAINER_ID))
                    .is_none());
                assert_eq!(
                    resource.get(&Key::from_static_str(CONTAINER_RUNTIME)),
                    Some("cri-o".into())
                );
            },
        );
    }

    #[test]
    fn test_container_detector_with_custom_lookup() {
        fn only_id(key: &str) -> Option<String> {
            (key == CONTAINER_ID_ENV_VAR).then(|| "0123456789ab".to_string())
        }

        let resource = ContainerResourceDetector { lookup_env: only_id }.detect();

        assert_eq!(resource.len(), 1);
        assert_eq!(
            resource.get(&Key::from_static_str(semconv::resource::CONTAINER_ID)),
            Some("0123456789ab".into())
        );
    }
}
