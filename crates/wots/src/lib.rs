//! Winternitz one-time-signature codec for on-chain value commitments.
//!
//! Every value a party publishes during the dispute is committed by revealing a point
//! partway along a per-position one-way hash chain. The verifier recomputes the chain
//! forward until it reaches a fixed public endpoint; the number of steps taken *is* the
//! committed nibble, so a single reveal is safe exactly once.
//!
//! Data nibbles and checksum nibbles are encoded in opposite directions along their
//! chains: re-hashing a revealed data link can only lower the decoded nibble, while
//! re-hashing a checksum link can only raise the decoded checksum. Since the checksum
//! must equal the sum of the data nibbles, any single-nibble forgery moves the two
//! sides apart and is detected.

use bitcoin::hashes::{hash160, ripemd160, Hash};
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The length of a hash-chain link in bytes.
pub const HASH_LEN: usize = 20;

/// A single link of a Winternitz hash chain.
pub type ChainLink = [u8; HASH_LEN];

/// The closed set of commitment flavors used on-chain.
///
/// Each flavor fixes the nibble width, the number of data nibbles and the number of
/// checksum nibbles, and therefore the exact witness and public-key sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WotsSpec {
    /// A 256-bit value in 3-bit nibbles: 86 data + 4 checksum nibbles.
    W256,
    /// A 256-bit value in 4-bit nibbles: 64 data + 3 checksum nibbles.
    W256x4,
    /// A 24-bit value in 3-bit nibbles: 8 data + 2 checksum nibbles.
    W24,
    /// A single 3-bit value with a single checksum nibble.
    W1,
    /// The list-pick variant of [`WotsSpec::W256x4`]: each witness link is followed by
    /// its plaintext step count so a script can look the endpoint up by index instead
    /// of searching the chain.
    W256x4Lp,
}

impl WotsSpec {
    /// Number of bits per nibble (the chain is `2^bits` steps long).
    pub const fn bits_per_nibble(&self) -> u32 {
        match self {
            WotsSpec::W256 | WotsSpec::W24 | WotsSpec::W1 => 3,
            WotsSpec::W256x4 | WotsSpec::W256x4Lp => 4,
        }
    }

    /// Number of nibbles carrying value bits.
    pub const fn data_nibbles(&self) -> usize {
        match self {
            WotsSpec::W256 => 86,
            WotsSpec::W256x4 | WotsSpec::W256x4Lp => 64,
            WotsSpec::W24 => 8,
            WotsSpec::W1 => 1,
        }
    }

    /// Number of nibbles carrying the checksum.
    pub const fn checksum_nibbles(&self) -> usize {
        match self {
            WotsSpec::W256 => 4,
            WotsSpec::W256x4 | WotsSpec::W256x4Lp => 3,
            WotsSpec::W24 => 2,
            WotsSpec::W1 => 1,
        }
    }

    /// Total number of chain positions (data then checksum).
    pub const fn total_nibbles(&self) -> usize {
        self.data_nibbles() + self.checksum_nibbles()
    }

    /// The width of the value domain in bits.
    pub const fn value_bits(&self) -> u64 {
        match self {
            WotsSpec::W256 | WotsSpec::W256x4 | WotsSpec::W256x4Lp => 256,
            WotsSpec::W24 => 24,
            WotsSpec::W1 => 3,
        }
    }

    /// The number of steps from a private chain link to its public endpoint.
    pub const fn chain_len(&self) -> u32 {
        1 << self.bits_per_nibble()
    }

    /// Whether witnesses interleave plaintext step counts with the chain links.
    pub const fn carries_plain_nibbles(&self) -> bool {
        matches!(self, WotsSpec::W256x4Lp)
    }

    /// The number of items in a well-formed witness for this flavor.
    pub const fn witness_items(&self) -> usize {
        if self.carries_plain_nibbles() {
            2 * self.total_nibbles()
        } else {
            self.total_nibbles()
        }
    }
}

/// The public endpoints of every chain position, data nibbles first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WotsPublicKey(pub Vec<ChainLink>);

/// An ordered witness: one revealed link per position, with plaintext step-count bytes
/// interleaved for the list-pick flavor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WotsSignature(pub Vec<Vec<u8>>);

/// Decode and structural failures.
///
/// [`WotsError::InvalidHash`] and [`WotsError::InvalidChecksum`] are the protocol's
/// signal that the publishing party lied; the remaining variants indicate locally
/// malformed inputs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WotsError {
    /// The value does not fit the flavor's domain.
    #[error("value wider than the {0}-bit domain")]
    ValueOutOfRange(u64),

    /// The witness has the wrong number of items for the flavor.
    #[error("witness has {actual} items, expected {expected}")]
    WitnessLength {
        /// Expected item count.
        expected: usize,
        /// Observed item count.
        actual: usize,
    },

    /// A witness item has the wrong byte length for its role.
    #[error("malformed witness item at position {0}")]
    MalformedWitness(usize),

    /// A revealed link never reaches the public endpoint within the chain length.
    #[error("chain walk at position {0} never reached the public key")]
    InvalidHash(usize),

    /// The decoded checksum disagrees with the sum of the decoded data nibbles.
    #[error("checksum mismatch: expected {expected}, decoded {actual}")]
    InvalidChecksum {
        /// Sum of the decoded data nibbles.
        expected: u32,
        /// Checksum value carried by the witness.
        actual: u32,
    },
}

/// One hash-chain step: RIPEMD160 over SHA256 of the previous link.
fn chain_step(link: &ChainLink) -> ChainLink {
    *hash160::Hash::hash(link).as_byte_array()
}

fn advance(mut link: ChainLink, steps: u32) -> ChainLink {
    for _ in 0..steps {
        link = chain_step(&link);
    }
    link
}

/// Derives the private chain link for one position.
///
/// The label keeps chains from distinct commitments disjoint even under a shared master
/// secret; the decimal position index keeps positions within one commitment disjoint.
pub fn private_key(secret: &[u8], label: &str, position: usize) -> ChainLink {
    let mut preimage = Vec::with_capacity(secret.len() + label.len() + 8);
    preimage.extend_from_slice(secret);
    preimage.extend_from_slice(label.as_bytes());
    preimage.push(b'/');
    preimage.extend_from_slice(position.to_string().as_bytes());
    *ripemd160::Hash::hash(&preimage).as_byte_array()
}

/// Derives the full public key for a commitment: every private link advanced by the
/// whole chain length.
pub fn public_key(spec: WotsSpec, secret: &[u8], label: &str) -> WotsPublicKey {
    let endpoints = (0..spec.total_nibbles())
        .map(|pos| advance(private_key(secret, label, pos), spec.chain_len()))
        .collect();
    WotsPublicKey(endpoints)
}

/// Splits a value into its data nibbles, least significant first.
fn data_nibbles(spec: WotsSpec, value: &BigUint) -> Result<Vec<u32>, WotsError> {
    if value.bits() > spec.value_bits() {
        return Err(WotsError::ValueOutOfRange(spec.value_bits()));
    }
    let bits = spec.bits_per_nibble();
    let mask = BigUint::from(spec.chain_len() - 1);
    let mut rest = value.clone();
    let mut nibbles = Vec::with_capacity(spec.data_nibbles());
    for _ in 0..spec.data_nibbles() {
        let nibble = u32::try_from(&rest & &mask).expect("masked to nibble width");
        nibbles.push(nibble);
        rest >>= bits;
    }
    debug_assert!(rest.is_zero());
    Ok(nibbles)
}

/// Splits a checksum into base-`2^bits` digits, least significant first.
fn checksum_nibbles(spec: WotsSpec, mut checksum: u32) -> Vec<u32> {
    let base = spec.chain_len();
    let mut digits = Vec::with_capacity(spec.checksum_nibbles());
    for _ in 0..spec.checksum_nibbles() {
        digits.push(checksum % base);
        checksum /= base;
    }
    debug_assert_eq!(checksum, 0, "checksum domain fits its digit count");
    digits
}

/// Encodes a value as a one-time reveal under the given master secret and label.
///
/// A data nibble `v` reveals the link `chain_len - v` steps past the private key, so a
/// decoder reaches the public endpoint in exactly `v` steps. A checksum nibble `c` is
/// encoded as the data encoding of `chain_len - 1 - c`, which inverts the direction a
/// forger can move it.
pub fn encode(
    spec: WotsSpec,
    secret: &[u8],
    label: &str,
    value: &BigUint,
) -> Result<WotsSignature, WotsError> {
    let data = data_nibbles(spec, value)?;
    let checksum = checksum_nibbles(spec, data.iter().sum());

    let steps_to_public = data
        .iter()
        .copied()
        .chain(checksum.iter().map(|c| spec.chain_len() - 1 - c));

    let mut items = Vec::with_capacity(spec.witness_items());
    for (pos, steps) in steps_to_public.enumerate() {
        let link = advance(
            private_key(secret, label, pos),
            spec.chain_len() - steps,
        );
        items.push(link.to_vec());
        if spec.carries_plain_nibbles() {
            items.push(vec![steps as u8]);
        }
    }
    Ok(WotsSignature(items))
}

/// Walks a revealed link forward until it meets the public endpoint, returning the step
/// count, or [`WotsError::InvalidHash`] if the endpoint is unreachable.
fn steps_to_endpoint(
    spec: WotsSpec,
    position: usize,
    link: ChainLink,
    endpoint: &ChainLink,
) -> Result<u32, WotsError> {
    let mut cur = link;
    for steps in 0..spec.chain_len() {
        if &cur == endpoint {
            return Ok(steps);
        }
        cur = chain_step(&cur);
    }
    Err(WotsError::InvalidHash(position))
}

fn link_item(items: &[Vec<u8>], index: usize, position: usize) -> Result<ChainLink, WotsError> {
    items[index]
        .as_slice()
        .try_into()
        .map_err(|_| WotsError::MalformedWitness(position))
}

/// Decodes a witness against a public key, returning the committed value.
///
/// The two failure modes matter to the protocol in different ways:
/// [`WotsError::InvalidHash`] means a link is not on its chain at all, while
/// [`WotsError::InvalidChecksum`] means every link is plausible but the nibbles were
/// not the ones originally signed.
pub fn decode(
    spec: WotsSpec,
    signature: &WotsSignature,
    public_key: &WotsPublicKey,
) -> Result<BigUint, WotsError> {
    if signature.0.len() != spec.witness_items() {
        return Err(WotsError::WitnessLength {
            expected: spec.witness_items(),
            actual: signature.0.len(),
        });
    }
    if public_key.0.len() != spec.total_nibbles() {
        return Err(WotsError::WitnessLength {
            expected: spec.total_nibbles(),
            actual: public_key.0.len(),
        });
    }

    let mut steps = Vec::with_capacity(spec.total_nibbles());
    for pos in 0..spec.total_nibbles() {
        let walked = if spec.carries_plain_nibbles() {
            let link = link_item(&signature.0, 2 * pos, pos)?;
            let claim = &signature.0[2 * pos + 1];
            if claim.len() != 1 || u32::from(claim[0]) >= spec.chain_len() {
                return Err(WotsError::MalformedWitness(pos));
            }
            // The plaintext byte lets us verify with a single fixed-length walk.
            let claimed = u32::from(claim[0]);
            if advance(link, claimed) != public_key.0[pos] {
                return Err(WotsError::InvalidHash(pos));
            }
            claimed
        } else {
            let link = link_item(&signature.0, pos, pos)?;
            steps_to_endpoint(spec, pos, link, &public_key.0[pos])?
        };
        steps.push(walked);
    }

    let data = &steps[..spec.data_nibbles()];
    let carried: u32 = steps[spec.data_nibbles()..]
        .iter()
        .enumerate()
        .map(|(j, s)| (spec.chain_len() - 1 - s) * spec.chain_len().pow(j as u32))
        .sum();
    let expected: u32 = data.iter().sum();
    if carried != expected {
        return Err(WotsError::InvalidChecksum {
            expected,
            actual: carried,
        });
    }

    let bits = spec.bits_per_nibble();
    let mut value = BigUint::zero();
    for (i, nibble) in data.iter().enumerate() {
        value |= BigUint::from(*nibble) << (bits as u64 * i as u64);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use num_traits::Num;
    use proptest::prelude::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    const SECRET: &[u8] = b"b138982ce17ac813d505b5b40b665d404e9528e7";

    const ALL_SPECS: [WotsSpec; 5] = [
        WotsSpec::W256,
        WotsSpec::W256x4,
        WotsSpec::W24,
        WotsSpec::W1,
        WotsSpec::W256x4Lp,
    ];

    fn sample_value(spec: WotsSpec, rng: &mut StdRng) -> BigUint {
        let mut bytes = vec![0u8; (spec.value_bits() as usize).div_ceil(8)];
        rng.fill(bytes.as_mut_slice());
        let value = BigUint::from_bytes_be(&bytes);
        value % (BigUint::from(1u8) << spec.value_bits())
    }

    #[test]
    fn round_trip_all_flavors() {
        let mut rng = StdRng::seed_from_u64(37);
        for spec in ALL_SPECS {
            let public = public_key(spec, SECRET, "rt");
            for _ in 0..8 {
                let value = sample_value(spec, &mut rng);
                let sig = encode(spec, SECRET, "rt", &value).unwrap();
                assert_eq!(decode(spec, &sig, &public).unwrap(), value, "{spec:?}");
            }
            // Domain edges.
            for value in [BigUint::zero(), (BigUint::from(1u8) << spec.value_bits()) - 1u8] {
                let sig = encode(spec, SECRET, "rt", &value).unwrap();
                assert_eq!(decode(spec, &sig, &public).unwrap(), value, "{spec:?}");
            }
        }
    }

    #[test]
    fn rejects_out_of_range_values() {
        let too_wide = BigUint::from(1u8) << 24;
        assert_eq!(
            encode(WotsSpec::W24, SECRET, "range", &too_wide),
            Err(WotsError::ValueOutOfRange(24))
        );
    }

    #[test]
    fn witness_sizes_match_spec() {
        for (spec, total, items) in [
            (WotsSpec::W256, 90, 90),
            (WotsSpec::W256x4, 67, 67),
            (WotsSpec::W24, 10, 10),
            (WotsSpec::W1, 2, 2),
            (WotsSpec::W256x4Lp, 67, 134),
        ] {
            assert_eq!(spec.total_nibbles(), total);
            assert_eq!(spec.witness_items(), items);
            let value = BigUint::from(3u8);
            let sig = encode(spec, SECRET, "size", &value).unwrap();
            assert_eq!(sig.0.len(), items);
            assert_eq!(public_key(spec, SECRET, "size").0.len(), total);
        }
    }

    /// Re-encoding any single nibble at a different value, while leaving the rest of
    /// the witness (checksum included) untouched, must trip the checksum.
    #[test]
    fn tamper_is_detected_at_every_position() {
        let spec = WotsSpec::W24;
        let label = "tamper";
        let public = public_key(spec, SECRET, label);
        let value = BigUint::from_str_radix("a5c3f1", 16).unwrap();
        let sig = encode(spec, SECRET, label, &value).unwrap();
        let nibbles = data_nibbles(spec, &value).unwrap();
        let checksum = checksum_nibbles(spec, nibbles.iter().sum());

        for pos in 0..spec.total_nibbles() {
            let honest = if pos < spec.data_nibbles() {
                nibbles[pos]
            } else {
                checksum[pos - spec.data_nibbles()]
            };
            let forged_nibble = (honest + 1) % spec.chain_len();
            let steps = if pos < spec.data_nibbles() {
                forged_nibble
            } else {
                spec.chain_len() - 1 - forged_nibble
            };
            let mut forged = sig.clone();
            forged.0[pos] =
                advance(private_key(SECRET, label, pos), spec.chain_len() - steps).to_vec();

            match decode(spec, &forged, &public) {
                Err(WotsError::InvalidChecksum { .. }) => {}
                other => panic!("position {pos}: expected checksum failure, got {other:?}"),
            }
        }
    }

    #[test]
    fn garbage_link_is_an_invalid_hash() {
        let spec = WotsSpec::W256x4;
        let public = public_key(spec, SECRET, "garbage");
        let mut sig = encode(spec, SECRET, "garbage", &BigUint::from(99u8)).unwrap();
        sig.0[5] = vec![0xab; HASH_LEN];
        assert_eq!(
            decode(spec, &sig, &public),
            Err(WotsError::InvalidHash(5))
        );
    }

    #[test]
    fn listpick_rejects_wrong_plain_nibble() {
        let spec = WotsSpec::W256x4Lp;
        let public = public_key(spec, SECRET, "lp");
        let sig = encode(spec, SECRET, "lp", &BigUint::from(77u8)).unwrap();

        let mut forged = sig.clone();
        let honest = forged.0[1][0];
        forged.0[1] = vec![(honest + 1) % spec.chain_len() as u8];
        assert!(matches!(
            decode(spec, &forged, &public),
            Err(WotsError::InvalidHash(0))
        ));

        let mut overflow = sig;
        overflow.0[1] = vec![spec.chain_len() as u8];
        assert_eq!(
            decode(spec, &overflow, &public),
            Err(WotsError::MalformedWitness(0))
        );
    }

    #[test]
    fn labels_separate_key_spaces() {
        let a = public_key(WotsSpec::W24, SECRET, "path/0");
        let b = public_key(WotsSpec::W24, SECRET, "path/1");
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn w24_round_trips(value in 0u32..(1 << 24)) {
            let public = public_key(WotsSpec::W24, SECRET, "prop");
            let value = BigUint::from(value);
            let sig = encode(WotsSpec::W24, SECRET, "prop", &value).unwrap();
            prop_assert_eq!(decode(WotsSpec::W24, &sig, &public).unwrap(), value);
        }
    }
}
