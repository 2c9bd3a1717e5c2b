//! Connection targets for terminal sessions.

use serde::{Deserialize, Serialize};

/// The container a session attaches to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionTarget {
    /// Kubernetes namespace of the pod.
    pub namespace: String,
    /// Pod name.
    pub pod: String,
    /// Container name within the pod.
    pub container: String,
}

impl SessionTarget {
    /// Creates a new session target.
    pub fn new(
        namespace: impl Into<String>,
        pod: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container: container.into(),
        }
    }

    /// Returns a copy of this target pointing at another container of the same pod.
    pub fn with_container(&self, container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            ..self.clone()
        }
    }
}

impl std::fmt::Display for SessionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.pod, self.container)
    }
}

/// Parameters an endpoint builder turns into a socket address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum EndpointParams {
    /// Execute a shell inside the target container.
    Exec {
        namespace: String,
        pod: String,
        container: String,
        shell: String,
    },
    /// Attach through an ephemeral debug container sharing the target's
    /// process namespace.
    DebugAttach {
        namespace: String,
        pod: String,
        container: String,
        debug_image: String,
        target_container: String,
    },
}

impl EndpointParams {
    /// Parameters for a normal shell exec.
    pub fn exec(target: &SessionTarget, shell: impl Into<String>) -> Self {
        EndpointParams::Exec {
            namespace: target.namespace.clone(),
            pod: target.pod.clone(),
            container: target.container.clone(),
            shell: shell.into(),
        }
    }

    /// Parameters for a debug-attach session against `target`.
    pub fn debug_attach(target: &SessionTarget, debug_image: impl Into<String>) -> Self {
        EndpointParams::DebugAttach {
            namespace: target.namespace.clone(),
            pod: target.pod.clone(),
            container: target.container.clone(),
            debug_image: debug_image.into(),
            target_container: target.container.clone(),
        }
    }

    /// Whether these parameters request a debug container.
    pub fn is_debug(&self) -> bool {
        matches!(self, EndpointParams::DebugAttach { .. })
    }
}
