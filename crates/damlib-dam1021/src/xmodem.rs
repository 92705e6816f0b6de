//! XMODEM-CRC sender for firmware and filter images.
//!
//! The console's `download` command drops the device into an XMODEM
//! receiver in CRC mode (it requests the transfer by emitting `C`).
//! The sender side implemented here pushes fixed 128-byte blocks, each
//! framed as
//!
//! ```text
//! SOH <seq> <255-seq> <128 data bytes, SUB-padded> <crc16 hi> <crc16 lo>
//! ```
//!
//! waits for a one-byte verdict per block (`ACK` advances, `NAK` or a
//! repeated `C` retransmits, `CAN CAN` aborts), and finishes with an
//! `EOT`/`ACK` handshake. Retransmissions are bounded; exhausting them
//! is a transfer-protocol failure, distinct from the surrounding
//! timeouts.

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use damlib_core::error::{Error, Result};
use damlib_core::transport::Transport;
use tracing::{debug, trace};

/// Start-of-header byte framing every 128-byte block.
pub const SOH: u8 = 0x01;
/// End of transmission.
pub const EOT: u8 = 0x04;
/// Block accepted.
pub const ACK: u8 = 0x06;
/// Block rejected, retransmit.
pub const NAK: u8 = 0x15;
/// Transfer cancelled by the receiver (two in a row).
pub const CAN: u8 = 0x18;
/// Padding byte for the final partial block.
pub const SUB: u8 = 0x1A;
/// CRC-mode request; the receiver repeats it until the first block
/// arrives.
pub const CRC_MODE_REQUEST: u8 = b'C';

/// Payload bytes per block.
pub const BLOCK_SIZE: usize = 128;

/// Send attempts per block (and for the EOT handshake) before the
/// transfer is declared failed.
pub const BLOCK_RETRY_LIMIT: u8 = 10;

/// CRC-16/XMODEM lookup table (polynomial 0x1021).
const CRC16_TABLE: [u16; 256] = {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut j = 0;
        while j < 8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Calculate CRC-16/XMODEM over a data block.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        let index = ((crc >> 8) ^ (byte as u16)) as usize;
        crc = (crc << 8) ^ CRC16_TABLE[index];
    }
    crc
}

/// Build one framed block. `data` must not exceed [`BLOCK_SIZE`]; short
/// data is SUB-padded.
pub fn build_block(sequence: u8, data: &[u8]) -> Vec<u8> {
    debug_assert!(data.len() <= BLOCK_SIZE);

    let mut padded = [SUB; BLOCK_SIZE];
    padded[..data.len()].copy_from_slice(data);

    let mut block = BytesMut::with_capacity(BLOCK_SIZE + 5);
    block.put_u8(SOH);
    block.put_u8(sequence);
    block.put_u8(!sequence);
    block.put_slice(&padded);
    block.put_u16(crc16(&padded));
    block.to_vec()
}

/// Send a whole payload through the block protocol.
///
/// The caller has already consumed the receiver's initial `C`; the
/// first block goes out immediately. `reply_timeout` bounds each wait
/// for a per-block verdict.
pub async fn send(
    transport: &mut dyn Transport,
    payload: &[u8],
    reply_timeout: Duration,
) -> Result<()> {
    let mut sequence: u8 = 1;
    let block_count = payload.len().div_ceil(BLOCK_SIZE);
    debug!(bytes = payload.len(), blocks = block_count, "starting block transfer");

    for data in payload.chunks(BLOCK_SIZE) {
        let block = build_block(sequence, data);
        send_block(transport, &block, sequence, reply_timeout).await?;
        sequence = sequence.wrapping_add(1);
    }

    finish(transport, reply_timeout).await?;
    debug!(blocks = block_count, "block transfer complete");
    Ok(())
}

/// Transmit one block until it is acknowledged, within the retry limit.
async fn send_block(
    transport: &mut dyn Transport,
    block: &[u8],
    sequence: u8,
    reply_timeout: Duration,
) -> Result<()> {
    for attempt in 1..=BLOCK_RETRY_LIMIT {
        if attempt > 1 {
            debug!(sequence, attempt, "retransmitting block");
        }
        transport.send(block).await?;

        match read_verdict(transport, reply_timeout).await? {
            Some(ACK) => return Ok(()),
            Some(NAK) | Some(CRC_MODE_REQUEST) => continue,
            Some(CAN) => {
                // A lone CAN can be line noise; two in a row is an abort.
                if read_verdict(transport, reply_timeout).await? == Some(CAN) {
                    return Err(Error::TransferProtocolFailed(
                        "receiver cancelled the transfer".into(),
                    ));
                }
                continue;
            }
            Some(other) => {
                trace!(sequence, reply = other, "unexpected block verdict");
                continue;
            }
            None => continue,
        }
    }

    Err(Error::TransferProtocolFailed(format!(
        "block {sequence} not acknowledged after {BLOCK_RETRY_LIMIT} attempts"
    )))
}

/// Complete the transfer with the EOT/ACK handshake.
async fn finish(transport: &mut dyn Transport, reply_timeout: Duration) -> Result<()> {
    for _ in 0..BLOCK_RETRY_LIMIT {
        transport.send(&[EOT]).await?;
        if read_verdict(transport, reply_timeout).await? == Some(ACK) {
            return Ok(());
        }
    }
    Err(Error::TransferProtocolFailed(
        "end of transmission not acknowledged".into(),
    ))
}

/// Read a single verdict byte, treating a quiet line as `None`.
async fn read_verdict(transport: &mut dyn Transport, timeout: Duration) -> Result<Option<u8>> {
    let mut byte = [0u8; 1];
    match transport.receive(&mut byte, timeout).await {
        Ok(n) if n > 0 => Ok(Some(byte[0])),
        Ok(_) => Ok(None),
        Err(Error::Timeout) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use damlib_test_harness::ScriptedTransport;

    const REPLY_TIMEOUT: Duration = Duration::from_millis(20);

    // -------------------------------------------------------------------
    // CRC and block framing
    // -------------------------------------------------------------------

    #[test]
    fn crc16_known_vector() {
        // Standard CRC-16/XMODEM check value.
        assert_eq!(crc16(b"123456789"), 0x31C3);
    }

    #[test]
    fn crc16_empty() {
        assert_eq!(crc16(b""), 0);
    }

    #[test]
    fn block_framing() {
        let block = build_block(1, b"hello");
        assert_eq!(block.len(), BLOCK_SIZE + 5);
        assert_eq!(block[0], SOH);
        assert_eq!(block[1], 1);
        assert_eq!(block[2], 0xFE);
        assert_eq!(&block[3..8], b"hello");
        // Padding after the data.
        assert!(block[8..3 + BLOCK_SIZE].iter().all(|&b| b == SUB));
        // CRC over the padded data, big-endian.
        let crc = crc16(&block[3..3 + BLOCK_SIZE]);
        assert_eq!(block[3 + BLOCK_SIZE], (crc >> 8) as u8);
        assert_eq!(block[4 + BLOCK_SIZE], (crc & 0xFF) as u8);
    }

    #[test]
    fn block_sequence_complement() {
        let block = build_block(0x42, &[0u8; BLOCK_SIZE]);
        assert_eq!(block[1], 0x42);
        assert_eq!(block[2], 0xBD);
    }

    // -------------------------------------------------------------------
    // Send engine
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn send_single_block() {
        let mut mock = ScriptedTransport::new();
        mock.expect(&build_block(1, b"abc"), &[ACK]);
        mock.expect(&[EOT], &[ACK]);

        send(&mut mock, b"abc", REPLY_TIMEOUT).await.unwrap();
        assert_eq!(mock.remaining_steps(), 0);
    }

    #[tokio::test]
    async fn send_splits_payload_into_blocks() {
        let payload = vec![0x55u8; BLOCK_SIZE + 10];
        let mut mock = ScriptedTransport::new();
        mock.expect(&build_block(1, &payload[..BLOCK_SIZE]), &[ACK]);
        mock.expect(&build_block(2, &payload[BLOCK_SIZE..]), &[ACK]);
        mock.expect(&[EOT], &[ACK]);

        send(&mut mock, &payload, REPLY_TIMEOUT).await.unwrap();
        assert_eq!(mock.remaining_steps(), 0);
    }

    #[tokio::test]
    async fn nak_triggers_retransmission() {
        let block = build_block(1, b"abc");
        let mut mock = ScriptedTransport::new();
        mock.expect(&block, &[NAK]);
        mock.expect(&block, &[ACK]);
        mock.expect(&[EOT], &[ACK]);

        send(&mut mock, b"abc", REPLY_TIMEOUT).await.unwrap();
    }

    #[tokio::test]
    async fn stray_crc_request_counts_as_retransmit() {
        let block = build_block(1, b"abc");
        let mut mock = ScriptedTransport::new();
        // The receiver was still repeating its mode request.
        mock.expect(&block, &[CRC_MODE_REQUEST]);
        mock.expect(&block, &[ACK]);
        mock.expect(&[EOT], &[ACK]);

        send(&mut mock, b"abc", REPLY_TIMEOUT).await.unwrap();
    }

    #[tokio::test]
    async fn double_cancel_aborts() {
        let block = build_block(1, b"abc");
        let mut mock = ScriptedTransport::new();
        mock.expect_chunks(&block, &[&[CAN], &[CAN]]);

        let result = send(&mut mock, b"abc", REPLY_TIMEOUT).await;
        assert!(matches!(result, Err(Error::TransferProtocolFailed(_))));
    }

    #[tokio::test]
    async fn single_cancel_is_retried() {
        let block = build_block(1, b"abc");
        let mut mock = ScriptedTransport::new();
        mock.expect_chunks(&block, &[&[CAN], &[NAK]]);
        mock.expect(&block, &[ACK]);
        mock.expect(&[EOT], &[ACK]);

        send(&mut mock, b"abc", REPLY_TIMEOUT).await.unwrap();
    }

    #[tokio::test]
    async fn retries_exhausted_is_protocol_failure() {
        let block = build_block(1, b"abc");
        let mut mock = ScriptedTransport::new();
        for _ in 0..BLOCK_RETRY_LIMIT {
            mock.expect(&block, &[NAK]);
        }

        let result = send(&mut mock, b"abc", REPLY_TIMEOUT).await;
        assert!(matches!(result, Err(Error::TransferProtocolFailed(_))));
    }

    #[tokio::test]
    async fn eot_retried_until_acknowledged() {
        let mut mock = ScriptedTransport::new();
        mock.expect(&build_block(1, b"abc"), &[ACK]);
        mock.expect(&[EOT], &[NAK]);
        mock.expect(&[EOT], &[ACK]);

        send(&mut mock, b"abc", REPLY_TIMEOUT).await.unwrap();
    }

    #[tokio::test]
    async fn empty_payload_sends_only_eot() {
        let mut mock = ScriptedTransport::new();
        mock.expect(&[EOT], &[ACK]);

        send(&mut mock, b"", REPLY_TIMEOUT).await.unwrap();
        assert_eq!(mock.sent_data().len(), 1);
    }
}
