//! Identifier newtypes used throughout the controller.
//!
//! Every id is a connection- or engine-scoped opaque string. Newtypes keep
//! room/peer/resource ids from being mixed up at call sites; the wire format
//! is the bare string.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

id_type! {
    /// Unique identifier for a room.
    RoomId
}

id_type! {
    /// Unique identifier for a peer. Connection-scoped: a reconnecting client
    /// gets a fresh peer id.
    PeerId
}

id_type! {
    /// Identifier of a routing context, assigned by the media engine.
    RouterId
}

id_type! {
    /// Identifier of a transport, assigned by the media engine.
    TransportId
}

id_type! {
    /// Identifier of a producer, assigned by the media engine.
    ProducerId
}

id_type! {
    /// Identifier of a consumer, assigned by the media engine.
    ConsumerId
}
