//! Debug-attach configuration.
//!
//! When a container has no usable shell the user can attach through an
//! ephemeral debug container that shares the target container's process
//! namespace. The coordinator only mutates configuration; the session
//! manager decides when that requires a reconnect.

use protocol::{EndpointParams, SessionTarget};

use crate::error::SessionError;

/// Image used for debug containers when none is configured.
pub const DEFAULT_DEBUG_IMAGE: &str = "busybox:latest";

/// Outcome of a debug configuration mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugChange {
    /// Debug mode was switched on.
    Entered,
    /// Debug mode was switched off.
    Exited,
    /// The debug image changed while debug mode was on.
    ImageChanged,
    /// Nothing that affects the connection changed.
    Unchanged,
}

impl DebugChange {
    /// Whether the live connection must be replaced.
    pub fn requires_reconnect(self) -> bool {
        !matches!(self, DebugChange::Unchanged)
    }
}

/// Owns the debug half of the session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugAttachCoordinator {
    enabled: bool,
    image: String,
}

impl DebugAttachCoordinator {
    /// Creates a coordinator with debug mode off.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            enabled: false,
            image: image.into(),
        }
    }

    /// Whether debug mode is on.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The image debug containers are created from.
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Switches debug mode on with `image`.
    pub fn enter_debug_mode(&mut self, image: &str) -> Result<DebugChange, SessionError> {
        let image = validate_image(image)?;
        if self.enabled && self.image == image {
            return Ok(DebugChange::Unchanged);
        }

        let was_enabled = self.enabled;
        self.enabled = true;
        self.image = image.to_string();
        tracing::info!(image = %self.image, "Debug mode enabled");

        Ok(if was_enabled {
            DebugChange::ImageChanged
        } else {
            DebugChange::Entered
        })
    }

    /// Switches debug mode off. The image is remembered for next time.
    pub fn exit_debug_mode(&mut self) -> DebugChange {
        if !self.enabled {
            return DebugChange::Unchanged;
        }
        self.enabled = false;
        tracing::info!("Debug mode disabled");
        DebugChange::Exited
    }

    /// Changes the debug image.
    ///
    /// Outside debug mode the new image is only stored.
    pub fn change_debug_image(&mut self, image: &str) -> Result<DebugChange, SessionError> {
        let image = validate_image(image)?;
        if self.image == image {
            return Ok(DebugChange::Unchanged);
        }
        self.image = image.to_string();
        if !self.enabled {
            return Ok(DebugChange::Unchanged);
        }
        tracing::info!(image = %self.image, "Debug image changed");
        Ok(DebugChange::ImageChanged)
    }

    /// Endpoint parameters for the next connection attempt.
    pub fn endpoint_params(&self, target: &SessionTarget, shell: &str) -> EndpointParams {
        if self.enabled {
            EndpointParams::debug_attach(target, &self.image)
        } else {
            EndpointParams::exec(target, shell)
        }
    }
}

impl Default for DebugAttachCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_DEBUG_IMAGE)
    }
}

fn validate_image(image: &str) -> Result<&str, SessionError> {
    let image = image.trim();
    if image.is_empty() {
        return Err(SessionError::InvalidDebugImage(image.to_string()));
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> SessionTarget {
        SessionTarget::new("default", "web-0", "app")
    }

    #[test]
    fn test_default_is_exec() {
        let coordinator = DebugAttachCoordinator::default();
        assert!(!coordinator.is_enabled());
        assert_eq!(coordinator.image(), DEFAULT_DEBUG_IMAGE);
        assert!(!coordinator.endpoint_params(&target(), "/bin/sh").is_debug());
    }

    #[test]
    fn test_enter_and_exit() {
        let mut coordinator = DebugAttachCoordinator::default();

        let change = coordinator.enter_debug_mode("nicolaka/netshoot").unwrap();
        assert_eq!(change, DebugChange::Entered);
        assert!(change.requires_reconnect());
        assert_eq!(
            coordinator.endpoint_params(&target(), "/bin/sh"),
            EndpointParams::debug_attach(&target(), "nicolaka/netshoot")
        );

        assert_eq!(coordinator.exit_debug_mode(), DebugChange::Exited);
        assert_eq!(coordinator.exit_debug_mode(), DebugChange::Unchanged);
        assert_eq!(coordinator.image(), "nicolaka/netshoot");
    }

    #[test]
    fn test_enter_twice_with_same_image_is_unchanged() {
        let mut coordinator = DebugAttachCoordinator::default();
        coordinator.enter_debug_mode("busybox:latest").unwrap();
        assert_eq!(
            coordinator.enter_debug_mode("busybox:latest").unwrap(),
            DebugChange::Unchanged
        );
        assert_eq!(
            coordinator.enter_debug_mode("alpine:3.20").unwrap(),
            DebugChange::ImageChanged
        );
    }

    #[test]
    fn test_change_image() {
        let mut coordinator = DebugAttachCoordinator::default();
        assert_eq!(
            coordinator.change_debug_image("alpine:3.20").unwrap(),
            DebugChange::Unchanged
        );
        assert_eq!(coordinator.image(), "alpine:3.20");

        coordinator.enter_debug_mode("alpine:3.20").unwrap();
        assert_eq!(
            coordinator.change_debug_image("busybox:1.36").unwrap(),
            DebugChange::ImageChanged
        );
        assert_eq!(
            coordinator.change_debug_image("busybox:1.36").unwrap(),
            DebugChange::Unchanged
        );
    }

    #[test]
    fn test_empty_image_rejected() {
        let mut coordinator = DebugAttachCoordinator::default();
        assert!(matches!(
            coordinator.enter_debug_mode("   "),
            Err(SessionError::InvalidDebugImage(_))
        ));
        assert!(!coordinator.is_enabled());
        assert!(coordinator.change_debug_image("").is_err());
    }
}
