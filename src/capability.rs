//! The plugin capability bitmap.
//!
//! Closed assignment, stable across host minor versions: the bit positions
//! are part of the plugin ABI, not an implementation detail.

use serde::{Deserialize, Serialize};

const HTTP_HANDLERS: u32 = 1 << 0;
const MIDDLEWARE: u32 = 1 << 1;
const SCHEDULER: u32 = 1 << 2;
const DATABASE_HOOKS: u32 = 1 << 3;
const EVENT_LISTENER: u32 = 1 << 4;
const TEMPLATE_EXTENSION: u32 = 1 << 5;
const CUSTOM_ROUTES: u32 = 1 << 6;
const WEBSOCKET: u32 = 1 << 7;

const KNOWN_BITS: u32 = HTTP_HANDLERS
    | MIDDLEWARE
    | SCHEDULER
    | DATABASE_HOOKS
    | EVENT_LISTENER
    | TEMPLATE_EXTENSION
    | CUSTOM_ROUTES
    | WEBSOCKET;

/// A single named capability flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Can register HTTP handlers.
    HttpHandlers,
    /// Can register HTTP middleware.
    Middleware,
    /// Can register scheduled/periodic tasks.
    Scheduler,
    /// Can hook into database operations.
    DatabaseHooks,
    /// Listens on the event bus.
    EventListener,
    /// Extends the template engine.
    TemplateExtension,
    /// Registers arbitrary custom routes.
    CustomRoutes,
    /// Provides a websocket endpoint.
    Websocket,
}

impl Capability {
    fn bit(self) -> u32 {
        match self {
            Capability::HttpHandlers => HTTP_HANDLERS,
            Capability::Middleware => MIDDLEWARE,
            Capability::Scheduler => SCHEDULER,
            Capability::DatabaseHooks => DATABASE_HOOKS,
            Capability::EventListener => EVENT_LISTENER,
            Capability::TemplateExtension => TEMPLATE_EXTENSION,
            Capability::CustomRoutes => CUSTOM_ROUTES,
            Capability::Websocket => WEBSOCKET,
        }
    }
}

/// The packed capability bitmap. Encodes/decodes to a stable `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(u32);

impl Capabilities {
    /// The empty set.
    pub const fn empty() -> Self {
        Capabilities(0)
    }

    /// Decode a raw bitmap. Reserved upper bits must be zero.
    pub fn from_bits(bits: u32) -> Option<Self> {
        if bits & !KNOWN_BITS != 0 {
            None
        } else {
            Some(Capabilities(bits))
        }
    }

    /// Decode a raw bitmap, silently masking off any reserved bits.
    ///
    /// Used where the caller has already validated the source and just
    /// wants the known subset (e.g. after `from_bits` rejected it, a
    /// diagnostic path may still want to know what *is* recognized).
    pub fn from_bits_truncate(bits: u32) -> Self {
        Capabilities(bits & KNOWN_BITS)
    }

    /// The raw bitmap.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Whether this set contains `capability`.
    pub fn contains(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    /// Returns a copy of this set with `capability` added.
    pub fn with(mut self, capability: Capability) -> Self {
        self.0 |= capability.bit();
        self
    }

    /// Returns a copy of this set with `capability` removed.
    pub fn without(mut self, capability: Capability) -> Self {
        self.0 &= !capability.bit();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_positions_match_the_abi_table() {
        assert_eq!(Capabilities::empty().with(Capability::HttpHandlers).bits(), 1);
        assert_eq!(Capabilities::empty().with(Capability::Websocket).bits(), 1 << 7);
    }

    #[test]
    fn rejects_reserved_upper_bits() {
        assert!(Capabilities::from_bits(1 << 8).is_none());
        assert!(Capabilities::from_bits(KNOWN_BITS).is_some());
    }

    #[test]
    fn contains_reflects_combination() {
        let caps = Capabilities::empty()
            .with(Capability::HttpHandlers)
            .with(Capability::Scheduler);
        assert!(caps.contains(Capability::HttpHandlers));
        assert!(caps.contains(Capability::Scheduler));
        assert!(!caps.contains(Capability::Websocket));
    }
}
