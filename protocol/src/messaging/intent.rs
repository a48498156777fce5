//! # Intent Payload
//!
//! The opaque blob carried with a transfer. It names the original requester
//! (so the destination credits the right user) and a free-form memo.
//!
//! Layout: `bincode(Intent)`, where the first field is a version byte.
//! Decoders reject unknown versions and trailing bytes.

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::config::{INTENT_VERSION, MAX_MEMO_LENGTH};
use crate::error::{FerryError, FerryResult};
use crate::types::Address;

/// Who asked for the transfer and why.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    /// Layout version, always [`INTENT_VERSION`] when encoded by this crate.
    pub version: u8,
    /// User the destination credits.
    pub requester: Address,
    /// Caller-supplied text.
    pub memo: String,
}

fn codec() -> impl Options {
    // Bounded so a hostile payload cannot make us allocate gigabytes.
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
        .with_limit((MAX_MEMO_LENGTH + 128) as u64)
}

impl Intent {
    /// Intent at the current layout version.
    pub fn new(requester: Address, memo: impl Into<String>) -> Self {
        Self {
            version: INTENT_VERSION,
            requester,
            memo: memo.into(),
        }
    }

    /// Serializes the intent.
    ///
    /// # Errors
    ///
    /// [`FerryError::MemoTooLong`] if the memo exceeds [`MAX_MEMO_LENGTH`].
    pub fn encode(&self) -> FerryResult<Vec<u8>> {
        if self.memo.len() > MAX_MEMO_LENGTH {
            return Err(FerryError::MemoTooLong {
                len: self.memo.len(),
                max: MAX_MEMO_LENGTH,
            });
        }
        codec()
            .serialize(self)
            .map_err(|e| FerryError::MalformedIntent(e.to_string()))
    }

    /// Parses and validates an intent.
    ///
    /// # Errors
    ///
    /// [`FerryError::MalformedIntent`] for undecodable bytes, an unknown
    /// version, or a null requester.
    pub fn decode(bytes: &[u8]) -> FerryResult<Self> {
        let intent: Intent = codec()
            .deserialize(bytes)
            .map_err(|e| FerryError::MalformedIntent(e.to_string()))?;
        if intent.version != INTENT_VERSION {
            return Err(FerryError::MalformedIntent(format!(
                "unsupported intent version {}",
                intent.version
            )));
        }
        if intent.requester.is_zero() {
            return Err(FerryError::MalformedIntent("null requester".into()));
        }
        if intent.memo.len() > MAX_MEMO_LENGTH {
            return Err(FerryError::MemoTooLong {
                len: intent.memo.len(),
                max: MAX_MEMO_LENGTH,
            });
        }
        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_recovers_requester_and_memo() {
        let requester = Address::repeat_byte(0x42);
        let bytes = Intent::new(requester, "swap to ETH at dest").encode().unwrap();
        let decoded = Intent::decode(&bytes).unwrap();
        assert_eq!(decoded.requester, requester);
        assert_eq!(decoded.memo, "swap to ETH at dest");
    }

    #[test]
    fn garbage_is_malformed() {
        let err = Intent::decode(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, FerryError::MalformedIntent(_)));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = Intent::new(Address::repeat_byte(1), "x").encode().unwrap();
        bytes.push(0);
        assert!(Intent::decode(&bytes).is_err());
    }

    #[test]
    fn unknown_version_rejected() {
        let mut intent = Intent::new(Address::repeat_byte(1), "");
        intent.version = INTENT_VERSION + 1;
        let bytes = codec().serialize(&intent).unwrap();
        let err = Intent::decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("unsupported intent version"));
    }

    #[test]
    fn null_requester_rejected() {
        let bytes = codec().serialize(&Intent::new(Address::ZERO, "")).unwrap();
        assert!(Intent::decode(&bytes).is_err());
    }

    #[test]
    fn oversized_memo_rejected_on_encode() {
        let memo = "a".repeat(MAX_MEMO_LENGTH + 1);
        let err = Intent::new(Address::repeat_byte(1), memo).encode().unwrap_err();
        assert!(matches!(err, FerryError::MemoTooLong { .. }));
    }
}
