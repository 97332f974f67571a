//! Component capabilities.
//!
//! A manager declares which optional behaviours its components use. The
//! descriptor is folded into a bit set once per definition and every
//! optional step of an invocation consults that bit set before touching
//! the manager.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Optional behaviours a component definition opts into.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct CapabilityFlags: u32 {
        /// Layout is chosen per instance instead of per definition
        const DYNAMIC_LAYOUT  = 0b0000_0000_0001;
        /// Root element tag name comes from the instance
        const DYNAMIC_TAG     = 0b0000_0000_0010;
        /// Manager may rewrite arguments before creation
        const PREPARE_ARGS    = 0b0000_0000_0100;
        /// Manager receives arguments at creation
        const CREATE_ARGS     = 0b0000_0000_1000;
        /// Caller attributes are forwarded to the root element
        const ATTRIBUTE_HOOK  = 0b0000_0001_0000;
        /// Manager is told about the root element
        const ELEMENT_HOOK    = 0b0000_0010_0000;
        /// Manager receives the dynamic scope
        const DYNAMIC_SCOPE   = 0b0000_0100_0000;
        /// Manager receives the caller's self
        const CREATE_CALLER   = 0b0000_1000_0000;
        /// Manager is notified on re-render
        const UPDATE_HOOK     = 0b0001_0000_0000;
        /// Manager produces instance state
        const CREATE_INSTANCE = 0b0010_0000_0000;
        /// Layout is the wrapped variant of the template
        const WRAPPED         = 0b0100_0000_0000;
        /// Destroyables may carry a will-destroy hook
        const WILL_DESTROY    = 0b1000_0000_0000;
    }
}

/// Boolean capability descriptor, as managers declare it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentCapabilities {
    pub dynamic_layout: bool,
    pub dynamic_tag: bool,
    pub prepare_args: bool,
    pub create_args: bool,
    pub attribute_hook: bool,
    pub element_hook: bool,
    pub dynamic_scope: bool,
    pub create_caller: bool,
    pub update_hook: bool,
    pub create_instance: bool,
    pub wrapped: bool,
    pub will_destroy: bool,
}

impl ComponentCapabilities {
    /// Template-only components: nothing optional
    pub const NONE: Self = Self {
        dynamic_layout: false,
        dynamic_tag: false,
        prepare_args: false,
        create_args: false,
        attribute_hook: false,
        element_hook: false,
        dynamic_scope: false,
        create_caller: false,
        update_hook: false,
        create_instance: false,
        wrapped: false,
        will_destroy: false,
    };

    pub const fn from_flags(flags: CapabilityFlags) -> Self {
        Self {
            dynamic_layout: flags.contains(CapabilityFlags::DYNAMIC_LAYOUT),
            dynamic_tag: flags.contains(CapabilityFlags::DYNAMIC_TAG),
            prepare_args: flags.contains(CapabilityFlags::PREPARE_ARGS),
            create_args: flags.contains(CapabilityFlags::CREATE_ARGS),
            attribute_hook: flags.contains(CapabilityFlags::ATTRIBUTE_HOOK),
            element_hook: flags.contains(CapabilityFlags::ELEMENT_HOOK),
            dynamic_scope: flags.contains(CapabilityFlags::DYNAMIC_SCOPE),
            create_caller: flags.contains(CapabilityFlags::CREATE_CALLER),
            update_hook: flags.contains(CapabilityFlags::UPDATE_HOOK),
            create_instance: flags.contains(CapabilityFlags::CREATE_INSTANCE),
            wrapped: flags.contains(CapabilityFlags::WRAPPED),
            will_destroy: flags.contains(CapabilityFlags::WILL_DESTROY),
        }
    }
}

/// Fold a descriptor into its bit set.
pub const fn capability_flags_from(capabilities: &ComponentCapabilities) -> CapabilityFlags {
    let mut bits = 0;
    if capabilities.dynamic_layout {
        bits |= CapabilityFlags::DYNAMIC_LAYOUT.bits();
    }
    if capabilities.dynamic_tag {
        bits |= CapabilityFlags::DYNAMIC_TAG.bits();
    }
    if capabilities.prepare_args {
        bits |= CapabilityFlags::PREPARE_ARGS.bits();
    }
    if capabilities.create_args {
        bits |= CapabilityFlags::CREATE_ARGS.bits();
    }
    if capabilities.attribute_hook {
        bits |= CapabilityFlags::ATTRIBUTE_HOOK.bits();
    }
    if capabilities.element_hook {
        bits |= CapabilityFlags::ELEMENT_HOOK.bits();
    }
    if capabilities.dynamic_scope {
        bits |= CapabilityFlags::DYNAMIC_SCOPE.bits();
    }
    if capabilities.create_caller {
        bits |= CapabilityFlags::CREATE_CALLER.bits();
    }
    if capabilities.update_hook {
        bits |= CapabilityFlags::UPDATE_HOOK.bits();
    }
    if capabilities.create_instance {
        bits |= CapabilityFlags::CREATE_INSTANCE.bits();
    }
    if capabilities.wrapped {
        bits |= CapabilityFlags::WRAPPED.bits();
    }
    if capabilities.will_destroy {
        bits |= CapabilityFlags::WILL_DESTROY.bits();
    }
    CapabilityFlags::from_bits_retain(bits)
}

pub fn has_capability(flags: CapabilityFlags, capability: CapabilityFlags) -> bool {
    flags.contains(capability)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_and_flags_agree() {
        let descriptor = ComponentCapabilities {
            create_instance: true,
            update_hook: true,
            dynamic_scope: true,
            ..ComponentCapabilities::NONE
        };
        let flags = capability_flags_from(&descriptor);
        assert_eq!(
            flags,
            CapabilityFlags::CREATE_INSTANCE | CapabilityFlags::UPDATE_HOOK | CapabilityFlags::DYNAMIC_SCOPE
        );
        assert_eq!(ComponentCapabilities::from_flags(flags), descriptor);
    }

    #[test]
    fn template_only_components_have_no_capabilities() {
        assert!(capability_flags_from(&ComponentCapabilities::NONE).is_empty());
        assert!(!has_capability(CapabilityFlags::empty(), CapabilityFlags::UPDATE_HOOK));
    }

    #[test]
    fn flags_serialize_as_a_readable_set() {
        let flags = CapabilityFlags::CREATE_INSTANCE | CapabilityFlags::WILL_DESTROY;
        let json = serde_json::to_string(&flags).unwrap();
        let back: CapabilityFlags = serde_json::from_str(&json).unwrap();
        assert_eq!(back, flags);
    }
}
