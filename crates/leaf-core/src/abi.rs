//! Codec for the batch-lock payload carried by `transfer_and_call`.
//!
//! The payload is the standard contract ABI encoding of the tuple
//! `(address[], uint256[])`: two head words holding byte offsets to the
//! dynamic arrays, followed by each array as a length word and its
//! 32-byte elements. Addresses are left padded with zeros; amounts are
//! big-endian words whose upper 128 bits must be zero to fit [`Amount`].

use crate::address::{Address, Amount, ADDRESS_LEN};
use crate::error::SettlementError;

pub const WORD: usize = 32;

const HEAD_LEN: usize = 2 * WORD;

/// Encode the recipients and amounts of a batch lock.
///
/// Slices of different length are encoded as given; the decoder is the one
/// that enforces equal lengths.
pub fn encode_lock_payload(recipients: &[Address], amounts: &[Amount]) -> Vec<u8> {
    let recipients_offset = HEAD_LEN;
    let amounts_offset = recipients_offset + WORD * (1 + recipients.len());
    let total = amounts_offset + WORD * (1 + amounts.len());

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&usize_word(recipients_offset));
    out.extend_from_slice(&usize_word(amounts_offset));

    out.extend_from_slice(&usize_word(recipients.len()));
    for recipient in recipients {
        let mut word = [0u8; WORD];
        word[WORD - ADDRESS_LEN..].copy_from_slice(recipient.as_bytes());
        out.extend_from_slice(&word);
    }

    out.extend_from_slice(&usize_word(amounts.len()));
    for amount in amounts {
        let mut word = [0u8; WORD];
        word[WORD - 16..].copy_from_slice(&amount.to_be_bytes());
        out.extend_from_slice(&word);
    }
    out
}

/// Decode a batch-lock payload into equal-length recipient and amount lists.
pub fn decode_lock_payload(data: &[u8]) -> Result<(Vec<Address>, Vec<Amount>), SettlementError> {
    if data.len() < HEAD_LEN {
        return Err(malformed(format!(
            "payload is {} bytes, head needs {HEAD_LEN}",
            data.len()
        )));
    }
    let recipients_offset = read_offset(data, 0)?;
    let amounts_offset = read_offset(data, WORD)?;

    let recipient_words = read_array(data, recipients_offset, "address[]")?;
    let amount_words = read_array(data, amounts_offset, "uint256[]")?;
    if recipient_words.len() != amount_words.len() {
        return Err(malformed(format!(
            "{} recipients but {} amounts",
            recipient_words.len(),
            amount_words.len()
        )));
    }

    let mut recipients = Vec::with_capacity(recipient_words.len());
    for (idx, word) in recipient_words.iter().enumerate() {
        if word[..WORD - ADDRESS_LEN].iter().any(|b| *b != 0) {
            return Err(malformed(format!("recipient {idx} is not a padded address")));
        }
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&word[WORD - ADDRESS_LEN..]);
        recipients.push(Address::new(bytes));
    }

    let mut amounts = Vec::with_capacity(amount_words.len());
    for (idx, word) in amount_words.iter().enumerate() {
        if word[..WORD - 16].iter().any(|b| *b != 0) {
            return Err(malformed(format!("amount {idx} exceeds 128 bits")));
        }
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&word[WORD - 16..]);
        amounts.push(Amount::from_be_bytes(bytes));
    }

    Ok((recipients, amounts))
}

fn malformed(reason: String) -> SettlementError {
    SettlementError::MalformedPayload(reason)
}

fn usize_word(value: usize) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&(value as u64).to_be_bytes());
    word
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8], SettlementError> {
    let end = offset
        .checked_add(WORD)
        .ok_or_else(|| malformed("offset overflow".into()))?;
    data.get(offset..end)
        .ok_or_else(|| malformed(format!("word at byte {offset} is out of bounds")))
}

fn read_usize(data: &[u8], offset: usize) -> Result<usize, SettlementError> {
    let word = word_at(data, offset)?;
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(malformed(format!("word at byte {offset} is too large")));
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&word[WORD - 8..]);
    usize::try_from(u64::from_be_bytes(bytes))
        .map_err(|_| malformed(format!("word at byte {offset} is too large")))
}

fn read_offset(data: &[u8], head_slot: usize) -> Result<usize, SettlementError> {
    let offset = read_usize(data, head_slot)?;
    if offset % WORD != 0 {
        return Err(malformed(format!("array offset {offset} is not word aligned")));
    }
    if offset < HEAD_LEN {
        return Err(malformed(format!("array offset {offset} points into the head")));
    }
    Ok(offset)
}

fn read_array<'a>(
    data: &'a [u8],
    offset: usize,
    kind: &str,
) -> Result<Vec<&'a [u8]>, SettlementError> {
    let len = read_usize(data, offset)?;
    let body = offset + WORD;
    // Refuse lengths the buffer could never hold before allocating anything.
    let available = data.len().saturating_sub(body) / WORD;
    if len > available {
        return Err(malformed(format!(
            "{kind} declares {len} elements but only {available} fit"
        )));
    }
    Ok((0..len)
        .map(|i| &data[body + i * WORD..body + (i + 1) * WORD])
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn addr(byte: u8) -> Address {
        Address::new([byte; ADDRESS_LEN])
    }

    #[test]
    fn single_recipient_layout_matches_abi() {
        let payload = encode_lock_payload(&[addr(0xaa)], &[1_000]);
        assert_eq!(payload.len(), 6 * WORD);
        assert_eq!(payload[WORD - 1], 0x40);
        assert_eq!(payload[2 * WORD - 1], 0x80);
        // address[] length, then the address itself
        assert_eq!(payload[3 * WORD - 1], 1);
        assert!(payload[3 * WORD..3 * WORD + 12].iter().all(|b| *b == 0));
        assert!(payload[3 * WORD + 12..4 * WORD].iter().all(|b| *b == 0xaa));
        // uint256[] length, then 1000 big-endian
        assert_eq!(payload[5 * WORD - 1], 1);
        assert_eq!(&payload[6 * WORD - 2..], &[0x03, 0xe8]);
    }

    #[test]
    fn decodes_what_it_encodes_for_random_batches() {
        let mut rng = StdRng::seed_from_u64(7);
        for n in [0usize, 1, 3, 17] {
            let recipients: Vec<Address> = (0..n).map(|_| Address::new(rng.gen())).collect();
            let amounts: Vec<Amount> = (0..n).map(|_| rng.gen()).collect();
            let payload = encode_lock_payload(&recipients, &amounts);
            let (r, a) = decode_lock_payload(&payload).unwrap();
            assert_eq!(r, recipients);
            assert_eq!(a, amounts);
        }
    }

    #[test]
    fn rejects_length_mismatch() {
        let payload = encode_lock_payload(&[addr(1), addr(2)], &[5]);
        let err = decode_lock_payload(&payload).unwrap_err();
        assert!(matches!(err, SettlementError::MalformedPayload(msg) if msg.contains("2 recipients but 1 amounts")));
    }

    #[test]
    fn rejects_truncated_and_short_payloads() {
        assert!(decode_lock_payload(&[0u8; 10]).is_err());
        let payload = encode_lock_payload(&[addr(1)], &[5]);
        let err = decode_lock_payload(&payload[..payload.len() - 1]).unwrap_err();
        assert!(matches!(err, SettlementError::MalformedPayload(_)));
    }

    #[test]
    fn rejects_misaligned_offsets_and_dirty_padding() {
        let mut payload = encode_lock_payload(&[addr(1)], &[5]);
        payload[WORD - 1] = 0x41;
        assert!(decode_lock_payload(&payload).is_err());

        let mut payload = encode_lock_payload(&[addr(1)], &[5]);
        payload[3 * WORD] = 0x01;
        assert!(decode_lock_payload(&payload).is_err());

        let mut payload = encode_lock_payload(&[addr(1)], &[5]);
        payload[5 * WORD] = 0x01;
        let err = decode_lock_payload(&payload).unwrap_err();
        assert!(matches!(err, SettlementError::MalformedPayload(msg) if msg.contains("128 bits")));
    }

    #[test]
    fn rejects_absurd_array_lengths_without_allocating() {
        let mut payload = encode_lock_payload(&[addr(1)], &[5]);
        payload[3 * WORD - 4..3 * WORD].copy_from_slice(&[0xff; 4]);
        assert!(decode_lock_payload(&payload).is_err());
    }
}
