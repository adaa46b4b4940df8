//! Errors raised while building a cluster template.

use crate::ids::{BelId, BelPinId, WireId};

/// A malformed cluster template description.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// Two wires with the same name and location.
    #[error("duplicate wire '{0}'")]
    DuplicateWire(String),

    /// Two BELs with the same name in one site.
    #[error("duplicate BEL '{name}' in site {site}")]
    DuplicateBel {
        /// BEL name.
        name: String,
        /// Site index.
        site: u32,
    },

    /// The BEL's type has no pin of this name.
    #[error("BEL '{bel}' has no pin '{pin}'")]
    UnknownPin {
        /// BEL name.
        bel: String,
        /// Pin name.
        pin: String,
    },

    /// A pin was bound to a wire twice.
    #[error("pin '{pin}' of BEL '{bel}' is already bound")]
    PinAlreadyBound {
        /// BEL name.
        bel: String,
        /// Pin name.
        pin: String,
    },

    /// A wire ID that does not belong to the template.
    #[error("wire {0} is not part of this template")]
    UnknownWire(WireId),

    /// A BEL ID that does not belong to the template.
    #[error("BEL {0} is not part of this template")]
    UnknownBel(BelId),

    /// A BEL pin ID that does not belong to the template.
    #[error("BEL pin {0} is not part of this template")]
    UnknownBelPin(BelPinId),

    /// LUT halves must be two different BELs of one site.
    #[error("BELs {0} and {1} cannot form a LUT pair")]
    InvalidLutPair(BelId, BelId),
}
