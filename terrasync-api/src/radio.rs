use super::message::Mac;

/// Connectionless broadcast/unicast radio link (ESP-NOW style).
///
/// Unicast only works after the destination MAC is registered as a peer
/// on the fleet channel; `Mac::BROADCAST` needs no registration. `send`
/// reports the stack's immediate accept/reject; the link gives no
/// delivery guarantee, so callers that need confirmation must rely on a
/// later inbound message from the peer.
#[allow(async_fn_in_trait)]
pub trait RadioLink {
    type Error: core::fmt::Debug;

    fn add_peer(&mut self, mac: Mac, channel: u8) -> Result<(), Self::Error>;

    fn remove_peer(&mut self, mac: Mac) -> Result<(), Self::Error>;

    async fn send(&mut self, dest: Mac, payload: &[u8]) -> Result<(), Self::Error>;
}
