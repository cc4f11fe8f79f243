//! Lock screen credentials as sensitive, self-erasing buffers.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Minimum number of cells in a pattern.
pub const MIN_LOCK_PATTERN_SIZE: usize = 4;

/// Minimum number of characters in a PIN or password.
pub const MIN_LOCK_PASSWORD_SIZE: usize = 4;

/// The kind of an LSKF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    /// No credential
    None,
    /// Pattern drawn on the 3x3 grid
    Pattern,
    /// Numeric PIN
    Pin,
    /// Alphanumeric password
    Password,
}

impl CredentialType {
    /// Minimum length a guess of this type must have to possibly be correct.
    pub fn min_len(&self) -> usize {
        match self {
            CredentialType::Pattern => MIN_LOCK_PATTERN_SIZE,
            CredentialType::Pin | CredentialType::Password => MIN_LOCK_PASSWORD_SIZE,
            CredentialType::None => 0,
        }
    }
}

impl std::fmt::Display for CredentialType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CredentialType::None => "none",
            CredentialType::Pattern => "pattern",
            CredentialType::Pin => "pin",
            CredentialType::Password => "password",
        };
        f.write_str(name)
    }
}

/// A guessed or stored LSKF.
///
/// The secret bytes are overwritten when the value is dropped. Cloning
/// produces an independent buffer with its own lifetime, so the rate limiter
/// can keep a guess after the caller erased theirs.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    #[zeroize(skip)]
    kind: CredentialType,
    secret: Vec<u8>,
}

impl Credential {
    /// Create a credential of the given type.
    pub fn new(kind: CredentialType, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            secret: secret.into(),
        }
    }

    /// An empty credential of type [`CredentialType::None`].
    pub fn none() -> Self {
        Self::new(CredentialType::None, Vec::new())
    }

    /// A PIN.
    pub fn pin(pin: impl Into<Vec<u8>>) -> Self {
        Self::new(CredentialType::Pin, pin)
    }

    /// A password.
    pub fn password(password: impl Into<Vec<u8>>) -> Self {
        Self::new(CredentialType::Password, password)
    }

    /// A pattern, one byte per cell.
    pub fn pattern(cells: impl Into<Vec<u8>>) -> Self {
        Self::new(CredentialType::Pattern, cells)
    }

    /// The type of this credential.
    pub fn kind(&self) -> CredentialType {
        self.kind
    }

    /// Length of the secret in bytes (cells for a pattern).
    pub fn len(&self) -> usize {
        self.secret.len()
    }

    /// Whether the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.secret.is_empty()
    }

    /// Whether the guess is shorter than any credential of its type can be.
    pub fn is_too_short(&self) -> bool {
        self.len() < self.kind.min_len()
    }

    /// Raw secret bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.secret
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.secret == other.secret
    }
}

impl Eq for Credential {}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("kind", &self.kind)
            .field("len", &self.secret.len())
            .finish()
    }
}
