//! `EndToEndContext`: the node's identity plus its session keys, passed
//! explicitly to every encrypt and decrypt call.

use shroud_crypto::codec;
use shroud_crypto::framing::{frame_for_recipient, split_recipient};
use shroud_crypto::identity::IdentityKeyPair;
use shroud_crypto::PeerId;

use crate::directory::PublishOutcome;
use crate::errors::CoreError;
use crate::fanout::{recipients, GroupDelivery};
use crate::session_keys::SessionKeys;
use crate::transport::{decode_wire, encode_wire, ChatTarget, Transport};

/// What became of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Plaintext(Vec<u8>),
    /// A group envelope addressed to another member; not decrypted.
    NotForUs { recipient: PeerId },
}

/// Per-target result of [`EndToEndContext::send`].
#[derive(Debug, Default)]
pub struct SendReport {
    pub delivered: Vec<PeerId>,
    pub skipped: Vec<(PeerId, CoreError)>,
}

impl SendReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

pub struct EndToEndContext {
    own_id: PeerId,
    identity: IdentityKeyPair,
    sessions: SessionKeys,
}

impl EndToEndContext {
    pub fn new(own_id: PeerId, identity: IdentityKeyPair, sessions: SessionKeys) -> Self {
        Self {
            own_id,
            identity,
            sessions,
        }
    }

    pub fn own_id(&self) -> PeerId {
        self.own_id
    }

    pub fn identity(&self) -> &IdentityKeyPair {
        &self.identity
    }

    pub fn sessions(&self) -> &SessionKeys {
        &self.sessions
    }

    /// Make sure the directory holds our current public key.
    pub async fn publish_identity(&self) -> Result<PublishOutcome, CoreError> {
        self.sessions
            .directory()
            .publish_if_changed(self.own_id, &self.identity.public_key())
            .await
            .map_err(|e| CoreError::DirectoryUnavailable(e.to_string()))
    }

    async fn seal(&self, peer_id: PeerId, plaintext: &[u8]) -> Result<Vec<u8>, CoreError> {
        let key = self.sessions.get_or_derive(&self.identity, peer_id).await?;
        codec::encrypt(&key, plaintext).map_err(|e| CoreError::Crypto(e.to_string()))
    }

    /// Encrypt a one-to-one message, returning wire text.
    pub async fn encrypt_for(&self, peer_id: PeerId, plaintext: &[u8]) -> Result<String, CoreError> {
        let envelope = self.seal(peer_id, plaintext).await?;
        Ok(encode_wire(&envelope))
    }

    /// Encrypt a group message separately for every participant except us.
    pub async fn encrypt_for_group(&self, participants: &[PeerId], plaintext: &[u8]) -> Vec<GroupDelivery> {
        let mut deliveries = Vec::new();
        for recipient in recipients(self.own_id, participants) {
            match self.seal(recipient, plaintext).await {
                Ok(envelope) => deliveries.push(GroupDelivery::Envelope {
                    recipient,
                    text: encode_wire(&frame_for_recipient(envelope, recipient)),
                }),
                Err(reason) => {
                    tracing::warn!(peer_id = %recipient, error = %reason, "Skipping group participant");
                    deliveries.push(GroupDelivery::Skipped { recipient, reason });
                }
            }
        }
        deliveries
    }

    /// Decrypt wire text received from `sender`.
    ///
    /// Group envelopes addressed to someone else come back as
    /// [`Inbound::NotForUs`] without any key lookup or decryption.
    pub async fn decrypt_from(&self, sender: PeerId, text: &str, is_group: bool) -> Result<Inbound, CoreError> {
        let raw = decode_wire(text).map_err(|e| CoreError::decrypt(sender, e))?;

        let envelope = if is_group {
            let (envelope, recipient) = split_recipient(&raw).map_err(|e| CoreError::decrypt(sender, e))?;
            if recipient != self.own_id {
                tracing::trace!(peer_id = %sender, recipient = %recipient, "Group envelope for another member");
                return Ok(Inbound::NotForUs { recipient });
            }
            envelope
        } else {
            raw.as_slice()
        };

        let key = self.sessions.get_or_derive(&self.identity, sender).await?;
        let plaintext = codec::decrypt(&key, envelope).map_err(|e| CoreError::decrypt(sender, e))?;
        Ok(Inbound::Plaintext(plaintext))
    }

    /// Encrypt and hand a message to the transport.
    ///
    /// For a group every member gets their own envelope in the group chat.
    /// Failures are per recipient and end up in the report.
    pub async fn send(&self, transport: &dyn Transport, target: ChatTarget, plaintext: &[u8]) -> SendReport {
        let mut report = SendReport::default();

        match target {
            ChatTarget::Peer(peer_id) => {
                let outcome = match self.encrypt_for(peer_id, plaintext).await {
                    Ok(text) => transport
                        .send_raw(target, &text)
                        .await
                        .map_err(|e| CoreError::Transport(e.to_string())),
                    Err(e) => Err(e),
                };
                match outcome {
                    Ok(()) => report.delivered.push(peer_id),
                    Err(e) => {
                        tracing::warn!(peer_id = %peer_id, error = %e, "Message not sent");
                        report.skipped.push((peer_id, e));
                    }
                }
            }
            ChatTarget::Group(group_id) => {
                let participants = match transport.participants(group_id).await {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!(group_id = %group_id, error = %e, "Could not list group participants");
                        return report;
                    }
                };

                for delivery in self.encrypt_for_group(&participants, plaintext).await {
                    match delivery {
                        GroupDelivery::Envelope { recipient, text } => {
                            match transport.send_raw(target, &text).await {
                                Ok(()) => report.delivered.push(recipient),
                                Err(e) => {
                                    tracing::warn!(peer_id = %recipient, error = %e, "Group envelope not sent");
                                    report.skipped.push((recipient, CoreError::Transport(e.to_string())));
                                }
                            }
                        }
                        GroupDelivery::Skipped { recipient, reason } => report.skipped.push((recipient, reason)),
                    }
                }
            }
        }

        report
    }

    /// Handle inbound wire text. Returns plaintext for display, or `None`
    /// when the message is not for us or cannot be decrypted.
    pub async fn receive(&self, sender: PeerId, text: &str, is_group: bool) -> Option<Vec<u8>> {
        match self.decrypt_from(sender, text, is_group).await {
            Ok(Inbound::Plaintext(plaintext)) => Some(plaintext),
            Ok(Inbound::NotForUs { .. }) => None,
            Err(e) => {
                tracing::warn!(peer_id = %sender, error = %e, "Dropping inbound message");
                None
            }
        }
    }
}
