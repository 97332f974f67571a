//! Development-time assertions.
//!
//! Capability gating on manager hooks and similar consistency checks run in
//! debug builds and whenever the `checked` feature is enabled.

use crate::capabilities::CapabilityFlags;
use crate::error::{Result, RuntimeError};

pub(crate) const CHECKED: bool = cfg!(any(debug_assertions, feature = "checked"));

/// Whether development-time assertions are compiled in.
pub fn checks_enabled() -> bool {
    CHECKED
}

/// Reject a hook call the definition's capabilities do not allow.
pub(crate) fn require_capability(
    flags: CapabilityFlags,
    capability: CapabilityFlags,
    hook: &'static str,
) -> Result<()> {
    if CHECKED && !flags.contains(capability) {
        return Err(RuntimeError::CapabilityViolation { capability, hook });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_capability_is_reported_with_the_hook_name() {
        let result = require_capability(
            CapabilityFlags::CREATE_INSTANCE,
            CapabilityFlags::UPDATE_HOOK,
            "update",
        );
        if !checks_enabled() {
            assert!(result.is_ok());
            return;
        }
        assert!(matches!(
            result,
            Err(RuntimeError::CapabilityViolation { capability, hook: "update" })
                if capability == CapabilityFlags::UPDATE_HOOK
        ));
    }

    #[test]
    fn present_capability_passes() {
        let flags = CapabilityFlags::CREATE_INSTANCE | CapabilityFlags::UPDATE_HOOK;
        assert!(require_capability(flags, CapabilityFlags::UPDATE_HOOK, "update").is_ok());
    }
}
