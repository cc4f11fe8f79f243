//! Identifiers for independently rate-limited credentials.

use serde::{Deserialize, Serialize};

/// Protector id reserved for special credentials that are not backed by a
/// per-user synthetic password protector.
pub const NULL_PROTECTOR_ID: u64 = 0;

/// User id of the factory reset protection credential.
pub const USER_FRP: i32 = -9999;

/// User id of the repair mode exit credential.
pub const USER_REPAIR_MODE: i32 = -9998;

/// A key that uniquely identifies one rate-limited LSKF.
///
/// The key is composed of the owning user and the protector that the LSKF
/// unlocks. Special credentials carry [`NULL_PROTECTOR_ID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LskfIdentifier {
    /// The user this LSKF belongs to
    pub user_id: i32,
    /// Opaque handle of the protector or special credential
    pub protector_id: u64,
}

impl LskfIdentifier {
    /// Create a new identifier.
    pub fn new(user_id: i32, protector_id: u64) -> Self {
        Self {
            user_id,
            protector_id,
        }
    }

    /// Identifier of a special credential owned by `user_id`.
    pub fn special(user_id: i32) -> Self {
        Self::new(user_id, NULL_PROTECTOR_ID)
    }

    /// Whether this identifies a special credential (e.g. FRP or repair
    /// mode). Special credentials have no persistent failure counter.
    pub fn is_special_credential(&self) -> bool {
        self.protector_id == NULL_PROTECTOR_ID
    }
}

impl std::fmt::Display for LskfIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user={} protector={:016x}", self.user_id, self.protector_id)
    }
}
