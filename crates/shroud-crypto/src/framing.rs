//! Group framing.
//!
//! A group message is fanned out as one envelope per recipient, each with
//! the recipient's identifier appended as exactly 20 ASCII decimal digits,
//! left-padded with `'0'`. One-to-one envelopes carry no suffix.

use crate::types::PeerId;

/// Width of the recipient suffix. `u64::MAX` has 20 decimal digits.
pub const RECIPIENT_FIELD_LEN: usize = 20;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("group envelope too short: {0} bytes")]
    TooShort(usize),
    #[error("recipient field is not a decimal identifier")]
    InvalidRecipient,
}

/// Encode `recipient` as the 20-byte zero-padded decimal field.
pub fn recipient_field(recipient: PeerId) -> [u8; RECIPIENT_FIELD_LEN] {
    let digits = format!("{:0>width$}", recipient.get(), width = RECIPIENT_FIELD_LEN);
    let mut field = [b'0'; RECIPIENT_FIELD_LEN];
    field.copy_from_slice(digits.as_bytes());
    field
}

/// Append the recipient suffix to an envelope.
pub fn frame_for_recipient(mut envelope: Vec<u8>, recipient: PeerId) -> Vec<u8> {
    envelope.extend_from_slice(&recipient_field(recipient));
    envelope
}

/// Split a group envelope into the inner envelope and its addressed recipient.
pub fn split_recipient(framed: &[u8]) -> Result<(&[u8], PeerId), FramingError> {
    if framed.len() < RECIPIENT_FIELD_LEN {
        return Err(FramingError::TooShort(framed.len()));
    }
    let (envelope, field) = framed.split_at(framed.len() - RECIPIENT_FIELD_LEN);

    if !field.iter().all(u8::is_ascii_digit) {
        return Err(FramingError::InvalidRecipient);
    }
    let text = std::str::from_utf8(field).map_err(|_| FramingError::InvalidRecipient)?;
    let id = text
        .parse::<u64>()
        .map_err(|_| FramingError::InvalidRecipient)?;

    Ok((envelope, PeerId(id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_field_padding() {
        assert_eq!(&recipient_field(PeerId(42)), b"00000000000000000042");
        assert_eq!(&recipient_field(PeerId(0)), b"00000000000000000000");
        assert_eq!(&recipient_field(PeerId(u64::MAX)), b"18446744073709551615");
    }

    #[test]
    fn test_frame_and_split() {
        let framed = frame_for_recipient(vec![1, 2, 3], PeerId(987654321));
        assert_eq!(framed.len(), 3 + RECIPIENT_FIELD_LEN);

        let (inner, who) = split_recipient(&framed).unwrap();
        assert_eq!(inner, &[1, 2, 3]);
        assert_eq!(who, PeerId(987654321));
    }

    #[test]
    fn test_split_rejects_short_input() {
        assert_eq!(split_recipient(&[b'1'; 19]), Err(FramingError::TooShort(19)));
    }

    #[test]
    fn test_split_rejects_non_digits() {
        let mut framed = vec![0u8; 32];
        framed.extend_from_slice(b"0000000000000000004x");
        assert_eq!(split_recipient(&framed), Err(FramingError::InvalidRecipient));
    }

    #[test]
    fn test_split_rejects_overflowing_id() {
        let mut framed = vec![0u8; 32];
        framed.extend_from_slice(b"99999999999999999999");
        assert_eq!(split_recipient(&framed), Err(FramingError::InvalidRecipient));
    }
}
