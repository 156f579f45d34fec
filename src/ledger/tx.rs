// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Transaction assembly and signing.
//!
//! The builder accumulates operations monotonically; engines append
//! whatever combination of change-trust, claim, path-payment and payment
//! operations a job needs and sign once at the end. Fees scale with the
//! operation count from the configured base fee.

use bigdecimal::{num_bigint::BigInt, BigDecimal, ToPrimitive};
use ed25519_dalek::{Signer as _, SigningKey};
use sha2::{Digest, Sha256};
use stellar_xdr::curr as xdr;
use stellar_xdr::curr::{Limits, WriteXdr};

use super::asset::Asset;
use super::error::Error;
use crate::utils::AMOUNT_SCALE;

/// Maximum operations a single transaction can carry.
pub const MAX_OPERATIONS: usize = 100;

/// A signing identity: the address and its ed25519 secret.
pub struct Signer {
    address: String,
    key: SigningKey,
}

impl Signer {
    pub fn from_secret(secret: &str) -> Result<Self, Error> {
        let private = stellar_strkey::ed25519::PrivateKey::from_string(secret)
            .map_err(|_| Error::invalid("secret seed", "S..."))?;
        let key = SigningKey::from_bytes(&private.0);
        let address = stellar_strkey::ed25519::PublicKey(key.verifying_key().to_bytes());
        Ok(Self {
            address: address.to_string(),
            key,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

/// A built and signed envelope ready for submission.
#[derive(Debug, Clone)]
pub struct SignedEnvelope {
    /// Hex transaction hash, known before submission.
    pub hash: String,
    /// Base64 XDR accepted by the submission endpoint.
    pub base64: String,
    pub operations: usize,
}

pub struct TxBuilder {
    source: xdr::MuxedAccount,
    sequence: i64,
    base_fee: u32,
    network_id: [u8; 32],
    memo: xdr::Memo,
    operations: Vec<xdr::Operation>,
}

impl TxBuilder {
    /// `current_sequence` is the account's sequence as reported by the
    /// ledger; the transaction consumes the next one.
    pub fn new(
        source: &str,
        current_sequence: i64,
        base_fee: u32,
        network_passphrase: &str,
    ) -> Result<Self, Error> {
        Ok(Self {
            source: muxed_account(source)?,
            sequence: current_sequence + 1,
            base_fee,
            network_id: Sha256::digest(network_passphrase.as_bytes()).into(),
            memo: xdr::Memo::None,
            operations: Vec::new(),
        })
    }

    pub fn set_memo_text(&mut self, text: &str) -> Result<(), Error> {
        let memo: xdr::StringM<28> = text
            .as_bytes()
            .to_vec()
            .try_into()
            .map_err(|_| Error::invalid("memo", text))?;
        self.memo = xdr::Memo::Text(memo);
        Ok(())
    }

    pub fn op_count(&self) -> usize {
        self.operations.len()
    }

    pub fn last_op_is_path_payment(&self) -> bool {
        matches!(
            self.operations.last().map(|op| &op.body),
            Some(xdr::OperationBody::PathPaymentStrictReceive(_))
        )
    }

    pub fn add_payment(
        &mut self,
        destination: &str,
        asset: &Asset,
        amount: &BigDecimal,
    ) -> Result<(), Error> {
        self.push(xdr::OperationBody::Payment(xdr::PaymentOp {
            destination: muxed_account(destination)?,
            asset: asset.to_xdr()?,
            amount: amount_to_stroops(amount)?,
        }))
    }

    pub fn add_change_trust(&mut self, asset: &Asset) -> Result<(), Error> {
        self.push(xdr::OperationBody::ChangeTrust(xdr::ChangeTrustOp {
            line: asset.to_change_trust_xdr()?,
            limit: i64::MAX,
        }))
    }

    pub fn add_claim_claimable_balance(&mut self, balance_id: &str) -> Result<(), Error> {
        self.push(xdr::OperationBody::ClaimClaimableBalance(
            xdr::ClaimClaimableBalanceOp {
                balance_id: parse_balance_id(balance_id)?,
            },
        ))
    }

    /// `path` holds intermediate hop assets only, never source or
    /// destination.
    pub fn add_path_payment_strict_receive(
        &mut self,
        destination: &str,
        send_asset: &Asset,
        send_max: &BigDecimal,
        dest_asset: &Asset,
        dest_amount: &BigDecimal,
        path: &[Asset],
    ) -> Result<(), Error> {
        let hops: Vec<xdr::Asset> = path
            .iter()
            .map(Asset::to_xdr)
            .collect::<Result<_, Error>>()?;
        self.push(xdr::OperationBody::PathPaymentStrictReceive(
            xdr::PathPaymentStrictReceiveOp {
                send_asset: send_asset.to_xdr()?,
                send_max: amount_to_stroops(send_max)?,
                destination: muxed_account(destination)?,
                dest_asset: dest_asset.to_xdr()?,
                dest_amount: amount_to_stroops(dest_amount)?,
                path: hops
                    .try_into()
                    .map_err(|_| Error::invalid("path", "more than 5 hops"))?,
            },
        ))
    }

    fn push(&mut self, body: xdr::OperationBody) -> Result<(), Error> {
        if self.operations.len() >= MAX_OPERATIONS {
            return Err(Error::invalid("operation count", "transaction is full"));
        }
        self.operations.push(xdr::Operation {
            source_account: None,
            body,
        });
        Ok(())
    }

    pub fn build_and_sign(self, signer: &Signer) -> Result<SignedEnvelope, Error> {
        let operations = self.operations.len();
        let fee = self
            .base_fee
            .saturating_mul(u32::try_from(operations).unwrap_or(u32::MAX));
        let tx = xdr::Transaction {
            source_account: self.source,
            fee,
            seq_num: xdr::SequenceNumber(self.sequence),
            cond: xdr::Preconditions::None,
            memo: self.memo,
            operations: self
                .operations
                .try_into()
                .map_err(|_| Error::invalid("operation count", "transaction is full"))?,
            ext: xdr::TransactionExt::V0,
        };

        let payload = xdr::TransactionSignaturePayload {
            network_id: xdr::Hash(self.network_id),
            tagged_transaction:
                xdr::TransactionSignaturePayloadTaggedTransaction::Tx(tx.clone()),
        };
        let digest: [u8; 32] =
            Sha256::digest(payload.to_xdr(Limits::none())?.as_slice()).into();

        let signature = signer.key.sign(&digest).to_bytes();
        let hint = {
            let public = signer.key.verifying_key().to_bytes();
            let mut hint = [0u8; 4];
            hint.copy_from_slice(&public[28..]);
            xdr::SignatureHint(hint)
        };
        let decorated = xdr::DecoratedSignature {
            hint,
            signature: xdr::Signature(
                signature
                    .to_vec()
                    .try_into()
                    .map_err(|_| Error::invalid("signature", "length"))?,
            ),
        };

        let envelope = xdr::TransactionEnvelope::Tx(xdr::TransactionV1Envelope {
            tx,
            signatures: vec![decorated]
                .try_into()
                .map_err(|_| Error::invalid("signature count", "overflow"))?,
        });

        Ok(SignedEnvelope {
            hash: hex::encode(digest),
            base64: envelope.to_xdr_base64(Limits::none())?,
            operations,
        })
    }
}

/// Decode a `G...` address into an XDR account id.
pub fn account_id(address: &str) -> Result<xdr::AccountId, Error> {
    let key = stellar_strkey::ed25519::PublicKey::from_string(address)
        .map_err(|_| Error::invalid("account address", address))?;
    Ok(xdr::AccountId(xdr::PublicKey::PublicKeyTypeEd25519(
        xdr::Uint256(key.0),
    )))
}

pub fn muxed_account(address: &str) -> Result<xdr::MuxedAccount, Error> {
    let key = stellar_strkey::ed25519::PublicKey::from_string(address)
        .map_err(|_| Error::invalid("account address", address))?;
    Ok(xdr::MuxedAccount::Ed25519(xdr::Uint256(key.0)))
}

/// Render an XDR account id back into its `G...` form.
pub fn account_to_string(id: &xdr::AccountId) -> String {
    let xdr::AccountId(xdr::PublicKey::PublicKeyTypeEd25519(xdr::Uint256(bytes))) = id;
    stellar_strkey::ed25519::PublicKey(*bytes).to_string()
}

pub fn muxed_to_string(account: &xdr::MuxedAccount) -> Option<String> {
    match account {
        xdr::MuxedAccount::Ed25519(xdr::Uint256(bytes)) => {
            Some(stellar_strkey::ed25519::PublicKey(*bytes).to_string())
        }
        xdr::MuxedAccount::MuxedEd25519(_) => None,
    }
}

/// Claimable balance ids are hex: a 4-byte type prefix followed by the
/// 32-byte hash.
pub fn parse_balance_id(id: &str) -> Result<xdr::ClaimableBalanceId, Error> {
    let bytes = hex::decode(id).map_err(|_| Error::invalid("claimable balance id", id))?;
    if bytes.len() != 36 || bytes[..4] != [0, 0, 0, 0] {
        return Err(Error::invalid("claimable balance id", id));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes[4..]);
    Ok(xdr::ClaimableBalanceId::ClaimableBalanceIdTypeV0(
        xdr::Hash(hash),
    ))
}

/// Convert a 7-dp decimal amount into ledger stroops, truncating any
/// sub-stroop digits.
pub fn amount_to_stroops(amount: &BigDecimal) -> Result<i64, Error> {
    let scaled = crate::utils::round_down(amount);
    let (digits, _) = scaled.into_bigint_and_exponent();
    digits
        .to_i64()
        .filter(|v| *v >= 0)
        .ok_or_else(|| Error::invalid("amount", amount.to_string()))
}

/// Convert ledger stroops into a 7-dp decimal.
pub fn stroops_to_amount(stroops: i64) -> BigDecimal {
    BigDecimal::new(BigInt::from(stroops), AMOUNT_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    // Deterministic test identity.
    fn test_signer() -> Signer {
        let key = SigningKey::from_bytes(&[7u8; 32]);
        let address = stellar_strkey::ed25519::PublicKey(key.verifying_key().to_bytes());
        Signer {
            address: address.to_string(),
            key,
        }
    }

    const BALANCE_ID: &str =
        "00000000da0d57da7d4850e7fc10d2a9d0ebc731f7afb40574c03395b17d49149b91f5be";

    #[test]
    fn amounts_convert_to_stroops() {
        let amount = BigDecimal::from_str("96.9696969").unwrap();
        assert_eq!(amount_to_stroops(&amount).unwrap(), 969_696_969);
        assert_eq!(stroops_to_amount(969_696_969), amount);
        assert!(amount_to_stroops(&BigDecimal::from(-1)).is_err());
    }

    #[test]
    fn balance_id_parses() {
        assert!(parse_balance_id(BALANCE_ID).is_ok());
        assert!(parse_balance_id("da0d57da").is_err());
        assert!(parse_balance_id("zz").is_err());
    }

    #[test]
    fn account_round_trips_through_xdr() {
        let signer = test_signer();
        let id = account_id(signer.address()).unwrap();
        assert_eq!(account_to_string(&id), signer.address());
    }

    #[test]
    fn builds_claim_and_convert_envelope() {
        let signer = test_signer();
        let issuer = test_signer().address().to_string();
        let asset = Asset::credit("XXX", &issuer);
        let reward = Asset::credit("AQUA", &issuer);

        let mut builder =
            TxBuilder::new(signer.address(), 17, 200_000, "Test SDF Network ; September 2015")
                .unwrap();
        builder.add_change_trust(&asset).unwrap();
        builder.add_claim_claimable_balance(BALANCE_ID).unwrap();
        builder
            .add_path_payment_strict_receive(
                signer.address(),
                &asset,
                &BigDecimal::from(100),
                &reward,
                &BigDecimal::from(1),
                &[Asset::Native],
            )
            .unwrap();
        assert!(builder.last_op_is_path_payment());

        let envelope = builder.build_and_sign(&signer).unwrap();
        assert_eq!(envelope.operations, 3);
        assert_eq!(envelope.hash.len(), 64);
        assert!(!envelope.base64.is_empty());
    }

    #[test]
    fn memo_rejects_over_28_bytes() {
        let signer = test_signer();
        let mut builder = TxBuilder::new(signer.address(), 0, 100, "passphrase").unwrap();
        assert!(builder.set_memo_text("Bribe: GDNJ...W2JR").is_ok());
        assert!(builder
            .set_memo_text("this memo text is far longer than the limit")
            .is_err());
    }

    #[test]
    fn payment_pages_cap_at_max_operations() {
        let signer = test_signer();
        let mut builder = TxBuilder::new(signer.address(), 0, 100, "passphrase").unwrap();
        let destination = signer.address().to_string();
        for _ in 0..MAX_OPERATIONS {
            builder
                .add_payment(&destination, &Asset::Native, &BigDecimal::from(1))
                .unwrap();
        }
        assert!(builder
            .add_payment(&destination, &Asset::Native, &BigDecimal::from(1))
            .is_err());
    }
}
