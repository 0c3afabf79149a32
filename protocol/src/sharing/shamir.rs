//! # Shamir Codec over GF(2^64)
//!
//! k-of-n sharing of arbitrary-length byte strings. The secret is padded
//! to a multiple of eight bytes and chunked big-endian into field
//! elements; every chunk gets its own uniformly random polynomial of
//! degree k − 1 with the chunk as constant term, evaluated at the fixed
//! points 1, 2, …, n. Reconstruction is per-chunk Lagrange interpolation
//! at x = 0.
//!
//! ## Share wire form
//!
//! For share index j: the big-endian 8-byte encoding of P_c(j) for each
//! chunk c in order, then a single byte holding the padding count. Share
//! length is therefore `8·⌈L/8⌉ + 1` and always ≡ 1 (mod 8).
//!
//! ## What this codec does not do
//!
//! The scheme is malleable: a share holder who knows the other evaluation
//! points can flip chosen bits of the reconstructed secret. Corruption
//! detection belongs to the integrity layer above, which hashes every
//! share and the secret itself with a shared salt.

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

use crate::config::FIELD_ID;
use crate::field::FieldElement;
use crate::metadata::wire::{WireError, WireReader, WireValue, WireWriter};

/// Largest padding count a share may carry: one less than the chunk width.
const MAX_PADDING: u8 = 7;

/// Field numbers of the serialized scheme record. Frozen.
const FIELD_K: u32 = 1;
const FIELD_N: u32 = 2;
const FIELD_FIELD_ID: u32 = 3;

/// Errors from sharing and reconstruction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShamirError {
    /// k and n must satisfy 1 ≤ k ≤ n.
    #[error("invalid sharing parameters: k = {k}, n = {n}")]
    InvalidParameters { k: u32, n: u32 },

    /// There is nothing to split.
    #[error("secret must not be empty")]
    EmptySecret,

    /// Reconstruction needs at least k shares.
    #[error("too few shares: need {needed}, got {got}")]
    TooFewShares { needed: u32, got: usize },

    /// A share's byte length is not ≡ 1 (mod 8).
    #[error("share length {0} is not one more than a multiple of 8")]
    BadShareLength(usize),

    /// A share's trailing padding byte is outside [0, 7].
    #[error("share padding byte {0} outside [0, 7]")]
    BadPadding(u8),

    /// Shares disagree on length or padding and cannot belong to one
    /// sharing.
    #[error("shares disagree on length or padding")]
    IncompatibleShares,

    /// Two shares carry the same evaluation point, or a point of zero.
    #[error("shares contain a duplicate or zero evaluation point")]
    BadEvaluationPoints,

    /// The serialized scheme record could not be parsed.
    #[error("malformed sharing scheme: {0}")]
    MalformedScheme(String),

    /// The scheme record names a field this implementation does not have.
    #[error("unknown field id {0:?}")]
    UnknownFieldId(String),
}

impl From<WireError> for ShamirError {
    fn from(e: WireError) -> Self {
        ShamirError::MalformedScheme(e.to_string())
    }
}

/// One share: the evaluation point index and the wire-form bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShamirShare {
    /// The evaluation point, in [1, n].
    pub index: u32,
    /// Wire-form share data: 8 bytes per chunk plus the padding byte.
    pub data: Vec<u8>,
}

/// A k-of-n sharing scheme bound to the one supported field.
///
/// # Example
/// ```
/// use svalbard_protocol::sharing::ShamirScheme;
///
/// let scheme = ShamirScheme::new(3, 5).unwrap();
/// let shares = scheme.split(b"the vault combination").unwrap();
/// let secret = scheme.reconstruct(&shares[1..4]).unwrap();
/// assert_eq!(secret, b"the vault combination");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShamirScheme {
    k: u32,
    n: u32,
}

impl ShamirScheme {
    /// Creates a scheme, validating 1 ≤ k ≤ n.
    pub fn new(k: u32, n: u32) -> Result<Self, ShamirError> {
        if k == 0 || n < k {
            return Err(ShamirError::InvalidParameters { k, n });
        }
        Ok(Self { k, n })
    }

    /// The reconstruction threshold.
    pub fn k(&self) -> u32 {
        self.k
    }

    /// The total number of shares.
    pub fn n(&self) -> u32 {
        self.n
    }

    /// Splits `secret` into n wire-form shares, any k of which
    /// reconstruct it.
    ///
    /// Polynomial coefficients come from the OS CSPRNG; with k = 1 there
    /// are none and every share carries the padded secret directly.
    pub fn split(&self, secret: &[u8]) -> Result<Vec<ShamirShare>, ShamirError> {
        if secret.is_empty() {
            return Err(ShamirError::EmptySecret);
        }

        let chunk_count = secret.len().div_ceil(8);
        let padding = (chunk_count * 8 - secret.len()) as u8;

        let mut padded = secret.to_vec();
        padded.resize(chunk_count * 8, 0);

        let share_len = chunk_count * 8 + 1;
        let mut shares: Vec<ShamirShare> = (1..=self.n)
            .map(|index| ShamirShare {
                index,
                data: Vec::with_capacity(share_len),
            })
            .collect();

        let mut rng = OsRng;
        let degree = (self.k - 1) as usize;
        let mut coefficients = vec![FieldElement::ZERO; degree + 1];

        for chunk in padded.chunks_exact(8) {
            coefficients[0] = FieldElement::from_be_bytes(chunk.try_into().expect("8-byte chunk"));
            for c in coefficients.iter_mut().skip(1) {
                *c = FieldElement::new(rng.next_u64());
            }

            for share in shares.iter_mut() {
                let x = FieldElement::new(share.index as u64);
                let y = eval_polynomial(&coefficients, x);
                share.data.extend_from_slice(&y.to_be_bytes());
            }
        }

        for share in shares.iter_mut() {
            share.data.push(padding);
        }

        Ok(shares)
    }

    /// Reconstructs the secret from k or more mutually consistent shares.
    ///
    /// All supplied shares participate in the interpolation — extra
    /// shares beyond k change nothing for an honest sharing and cost one
    /// Lagrange term each.
    pub fn reconstruct(&self, shares: &[ShamirShare]) -> Result<Vec<u8>, ShamirError> {
        if (shares.len() as u64) < self.k as u64 {
            return Err(ShamirError::TooFewShares {
                needed: self.k,
                got: shares.len(),
            });
        }

        let first = &shares[0];
        if first.data.len() % 8 != 1 {
            return Err(ShamirError::BadShareLength(first.data.len()));
        }
        let padding = *first.data.last().expect("length checked above");
        if padding > MAX_PADDING {
            return Err(ShamirError::BadPadding(padding));
        }
        for share in shares {
            if share.data.len() % 8 != 1 {
                return Err(ShamirError::BadShareLength(share.data.len()));
            }
            if share.data.len() != first.data.len()
                || *share.data.last().expect("non-empty") != padding
            {
                return Err(ShamirError::IncompatibleShares);
            }
        }

        let xs: Vec<FieldElement> = shares
            .iter()
            .map(|s| FieldElement::new(s.index as u64))
            .collect();
        let weights = lagrange_weights(&xs)?;

        let chunk_count = (first.data.len() - 1) / 8;
        let mut secret = Vec::with_capacity(chunk_count * 8);

        for c in 0..chunk_count {
            let mut acc = FieldElement::ZERO;
            for (share, &w) in shares.iter().zip(&weights) {
                let bytes: [u8; 8] = share.data[c * 8..(c + 1) * 8]
                    .try_into()
                    .expect("8-byte chunk");
                acc = acc + FieldElement::from_be_bytes(bytes) * w;
            }
            secret.extend_from_slice(&acc.to_be_bytes());
        }

        secret.truncate(chunk_count * 8 - padding as usize);
        Ok(secret)
    }

    /// Serializes the scheme as a field-tagged record: k, n, field id.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.varint(FIELD_K, self.k as u64);
        w.varint(FIELD_N, self.n as u64);
        w.string(FIELD_FIELD_ID, FIELD_ID);
        w.finish()
    }

    /// Parses a serialized scheme record.
    ///
    /// A syntactically broken record is malformed (invalid-argument), a
    /// well-formed record naming a different field is a distinct unknown-
    /// field error, and out-of-range parameters fail the same validation
    /// as [`new`](Self::new).
    pub fn from_wire(bytes: &[u8]) -> Result<Self, ShamirError> {
        let mut k: Option<u64> = None;
        let mut n: Option<u64> = None;
        let mut field_id: Option<String> = None;

        let mut reader = WireReader::new(bytes);
        while let Some((field, value)) = reader.next_field()? {
            match (field, value) {
                (FIELD_K, WireValue::Varint(v)) => k = Some(v),
                (FIELD_N, WireValue::Varint(v)) => n = Some(v),
                (FIELD_FIELD_ID, WireValue::Bytes(b)) => {
                    let s = std::str::from_utf8(b).map_err(|_| {
                        ShamirError::MalformedScheme("field id is not UTF-8".into())
                    })?;
                    field_id = Some(s.to_string());
                }
                _ => {} // unknown fields from newer clients
            }
        }

        let k = k.ok_or_else(|| ShamirError::MalformedScheme("missing k".into()))?;
        let n = n.ok_or_else(|| ShamirError::MalformedScheme("missing n".into()))?;
        let field_id =
            field_id.ok_or_else(|| ShamirError::MalformedScheme("missing field id".into()))?;

        if field_id != FIELD_ID {
            return Err(ShamirError::UnknownFieldId(field_id));
        }
        let k = u32::try_from(k)
            .map_err(|_| ShamirError::MalformedScheme("k out of range".into()))?;
        let n = u32::try_from(n)
            .map_err(|_| ShamirError::MalformedScheme("n out of range".into()))?;
        Self::new(k, n)
    }
}

/// Horner evaluation of a polynomial given in ascending coefficient order.
fn eval_polynomial(coefficients: &[FieldElement], x: FieldElement) -> FieldElement {
    let mut acc = FieldElement::ZERO;
    for &c in coefficients.iter().rev() {
        acc = acc * x + c;
    }
    acc
}

/// Lagrange basis values at x = 0 for the given evaluation points:
/// `w_i = Π x_j · (x_i · Π_{j≠i}(x_i + x_j))^{-1}`.
///
/// A duplicate point (or a zero point) zeroes a denominator; the
/// resulting inversion failure is the only duplicate detection this codec
/// performs.
fn lagrange_weights(xs: &[FieldElement]) -> Result<Vec<FieldElement>, ShamirError> {
    let full_product = xs
        .iter()
        .fold(FieldElement::ONE, |acc, &x| acc * x);

    xs.iter()
        .enumerate()
        .map(|(i, &x_i)| {
            let mut denominator = x_i;
            for (j, &x_j) in xs.iter().enumerate() {
                if i != j {
                    denominator = denominator * (x_i + x_j);
                }
            }
            let inv = denominator
                .inverse()
                .map_err(|_| ShamirError::BadEvaluationPoints)?;
            Ok(full_product * inv)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
