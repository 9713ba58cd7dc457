use strum_macros::{Display, EnumString, FromRepr};

/// Lifecycle of the flip maneuver. Cyclic: a full or aborted cycle always
/// ends back in `Disabled`, the only state reachable from outside the
/// maneuver's own transition logic.
///
/// The discriminants are the integer values mirrored into the vehicle
/// status topic; the lowercase names are the ones accepted by the
/// `change <name>` console verb.
#[derive(Debug, Display, EnumString, FromRepr, Clone, Copy, PartialEq, Eq, Default)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum FlipState {
    #[default]
    Disabled = 0,
    Start = 1,
    Roll = 2,
    Recover = 3,
    Finished = 4,
}

impl FlipState {
    pub fn as_raw(self) -> u8 { self as u8 }

    /// True while the maneuver holds control authority in any form.
    pub fn is_active(self) -> bool { !matches!(self, FlipState::Disabled) }
}
