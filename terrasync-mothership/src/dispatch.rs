//! Outbound frame dispatch with bounded retry.
//!
//! The link gives no delivery guarantee; retry only papers over the
//! stack's transient accept/reject, so attempts are few and the delay
//! between them short.

use embassy_time::Timer;
use log::{debug, warn};
use terrasync_api::{Mac, Message, RadioLink, encode_message};

use crate::error::{Error, Result};

/// Encode and transmit once.
pub async fn send_frame<R: RadioLink>(radio: &mut R, dest: Mac, message: &Message) -> Result<()> {
    let frame = encode_message(message).map_err(|_| Error::Serialization)?;
    radio.send(dest, &frame).await.map_err(|err| {
        debug!("send to {} rejected: {:?}", dest, err);
        Error::SendFailed
    })
}

/// Transmit with up to `attempts` tries, pausing `delay_ms` between
/// them. Encoding errors are not retried.
pub async fn send_with_retry<R: RadioLink>(
    radio: &mut R,
    dest: Mac,
    message: &Message,
    attempts: u8,
    delay_ms: u64,
) -> Result<()> {
    let frame = encode_message(message).map_err(|_| Error::Serialization)?;
    for attempt in 1..=attempts.max(1) {
        match radio.send(dest, &frame).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                debug!(
                    "send to {} attempt {}/{} rejected: {:?}",
                    dest, attempt, attempts, err
                );
                if attempt < attempts {
                    Timer::after_millis(delay_ms).await;
                }
            }
        }
    }
    warn!("giving up on send to {}", dest);
    Err(Error::SendFailed)
}
