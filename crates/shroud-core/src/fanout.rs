//! Group fan-out: one envelope per participant, never one for ourselves.

use shroud_crypto::PeerId;

use crate::errors::CoreError;

/// Outcome of encrypting a group message for one participant.
#[derive(Debug)]
pub enum GroupDelivery {
    /// Wire text carrying the recipient suffix.
    Envelope { recipient: PeerId, text: String },
    /// No envelope could be produced for this participant.
    Skipped { recipient: PeerId, reason: CoreError },
}

impl GroupDelivery {
    pub fn recipient(&self) -> PeerId {
        match self {
            GroupDelivery::Envelope { recipient, .. } | GroupDelivery::Skipped { recipient, .. } => *recipient,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            GroupDelivery::Envelope { text, .. } => Some(text),
            GroupDelivery::Skipped { .. } => None,
        }
    }
}

/// Participants to encrypt for: first occurrence order, self and duplicates removed.
pub fn recipients(own_id: PeerId, participants: &[PeerId]) -> Vec<PeerId> {
    let mut out: Vec<PeerId> = Vec::with_capacity(participants.len());
    for &peer in participants {
        if peer != own_id && !out.contains(&peer) {
            out.push(peer);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipients_skip_self_and_duplicates() {
        let ids = [PeerId(3), PeerId(1), PeerId(2), PeerId(3), PeerId(1)];
        assert_eq!(recipients(PeerId(1), &ids), vec![PeerId(3), PeerId(2)]);
    }

    #[test]
    fn test_recipients_only_self() {
        assert!(recipients(PeerId(1), &[PeerId(1)]).is_empty());
    }
}
