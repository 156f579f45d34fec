// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Asset identity as Horizon exposes it: the native lumen or an issued
//! `code:issuer` pair. Codes are 1..=12 alphanumeric characters, issuers
//! are 56-character `G...` addresses.

use std::fmt;

use serde::{Deserialize, Serialize};
use stellar_xdr::curr as xdr;

use super::error::Error;
use super::tx::account_id;

pub const NATIVE_CODE: &str = "XLM";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    Native,
    Credit { code: String, issuer: String },
}

impl Asset {
    pub fn native() -> Self {
        Asset::Native
    }

    pub fn credit(code: &str, issuer: &str) -> Self {
        Asset::Credit {
            code: code.to_string(),
            issuer: issuer.to_string(),
        }
    }

    /// Build from stored `(code, issuer)` columns where the native asset is
    /// kept as an empty issuer.
    pub fn from_parts(code: &str, issuer: &str) -> Self {
        if issuer.is_empty() {
            Asset::Native
        } else {
            Asset::credit(code, issuer)
        }
    }

    /// Parse the Horizon string form: `native` or `CODE:ISSUER`.
    pub fn from_horizon(raw: &str) -> Result<Self, Error> {
        if raw == "native" {
            return Ok(Asset::Native);
        }
        match raw.split_once(':') {
            Some((code, issuer))
                if !code.is_empty() && code.len() <= 12 && issuer.len() == 56 =>
            {
                Ok(Asset::credit(code, issuer))
            }
            _ => Err(Error::invalid("asset", raw)),
        }
    }

    /// The string form accepted by Horizon query parameters.
    pub fn to_horizon(&self) -> String {
        match self {
            Asset::Native => "native".to_string(),
            Asset::Credit { code, issuer } => format!("{code}:{issuer}"),
        }
    }

    /// The `asset_type` discriminator Horizon uses in balances and paths.
    pub fn horizon_type(&self) -> &'static str {
        match self {
            Asset::Native => "native",
            Asset::Credit { code, .. } if code.len() <= 4 => "credit_alphanum4",
            Asset::Credit { .. } => "credit_alphanum12",
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native)
    }

    pub fn code(&self) -> &str {
        match self {
            Asset::Native => NATIVE_CODE,
            Asset::Credit { code, .. } => code,
        }
    }

    /// Issuer address, empty for the native asset (the stored form).
    pub fn issuer(&self) -> &str {
        match self {
            Asset::Native => "",
            Asset::Credit { issuer, .. } => issuer,
        }
    }

    /// Abbreviated form for log lines: `CODE:ABCD...WXYZ`.
    pub fn short(&self) -> String {
        match self {
            Asset::Native => NATIVE_CODE.to_string(),
            Asset::Credit { code, issuer } => {
                format!("{code}:{}", crate::utils::short_key(issuer))
            }
        }
    }

    pub fn to_xdr(&self) -> Result<xdr::Asset, Error> {
        match self {
            Asset::Native => Ok(xdr::Asset::Native),
            Asset::Credit { code, issuer } => {
                let issuer = account_id(issuer)?;
                if code.len() <= 4 {
                    let mut bytes = [0u8; 4];
                    bytes[..code.len()].copy_from_slice(code.as_bytes());
                    Ok(xdr::Asset::CreditAlphanum4(xdr::AlphaNum4 {
                        asset_code: xdr::AssetCode4(bytes),
                        issuer,
                    }))
                } else if code.len() <= 12 {
                    let mut bytes = [0u8; 12];
                    bytes[..code.len()].copy_from_slice(code.as_bytes());
                    Ok(xdr::Asset::CreditAlphanum12(xdr::AlphaNum12 {
                        asset_code: xdr::AssetCode12(bytes),
                        issuer,
                    }))
                } else {
                    Err(Error::invalid("asset code", code))
                }
            }
        }
    }

    pub fn to_change_trust_xdr(&self) -> Result<xdr::ChangeTrustAsset, Error> {
        Ok(match self.to_xdr()? {
            xdr::Asset::Native => xdr::ChangeTrustAsset::Native,
            xdr::Asset::CreditAlphanum4(a) => xdr::ChangeTrustAsset::CreditAlphanum4(a),
            xdr::Asset::CreditAlphanum12(a) => xdr::ChangeTrustAsset::CreditAlphanum12(a),
        })
    }

    /// Back-conversion from XDR, used when walking result meta.
    pub fn from_xdr(asset: &xdr::Asset) -> Self {
        match asset {
            xdr::Asset::Native => Asset::Native,
            xdr::Asset::CreditAlphanum4(a) => Asset::credit(
                &asset_code_to_string(&a.asset_code.0),
                &super::tx::account_to_string(&a.issuer),
            ),
            xdr::Asset::CreditAlphanum12(a) => Asset::credit(
                &asset_code_to_string(&a.asset_code.0),
                &super::tx::account_to_string(&a.issuer),
            ),
        }
    }

    pub fn from_trust_line_xdr(asset: &xdr::TrustLineAsset) -> Option<Self> {
        match asset {
            xdr::TrustLineAsset::Native => Some(Asset::Native),
            xdr::TrustLineAsset::CreditAlphanum4(a) => Some(Asset::credit(
                &asset_code_to_string(&a.asset_code.0),
                &super::tx::account_to_string(&a.issuer),
            )),
            xdr::TrustLineAsset::CreditAlphanum12(a) => Some(Asset::credit(
                &asset_code_to_string(&a.asset_code.0),
                &super::tx::account_to_string(&a.issuer),
            )),
            xdr::TrustLineAsset::PoolShare(_) => None,
        }
    }
}

fn asset_code_to_string(bytes: &[u8]) -> String {
    let trimmed: Vec<u8> = bytes.iter().copied().take_while(|b| *b != 0).collect();
    String::from_utf8_lossy(&trimmed).into_owned()
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_horizon())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUER: &str = "GBNZILSTVQZ4R7IKQDGHYGY2QXL5QOFJYQMXPKWRRM5PAV7Y4M67AQUA";

    #[test]
    fn parses_native() {
        assert_eq!(Asset::from_horizon("native").unwrap(), Asset::Native);
    }

    #[test]
    fn parses_issued() {
        let asset = Asset::from_horizon(&format!("AQUA:{ISSUER}")).unwrap();
        assert_eq!(asset.code(), "AQUA");
        assert_eq!(asset.issuer(), ISSUER);
        assert_eq!(asset.horizon_type(), "credit_alphanum4");
        assert_eq!(
            Asset::from_horizon(&format!("LONGCODE12:{ISSUER}"))
                .unwrap()
                .horizon_type(),
            "credit_alphanum12"
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(Asset::from_horizon("").is_err());
        assert!(Asset::from_horizon("AQUA").is_err());
        assert!(Asset::from_horizon("AQUA:tooshort").is_err());
    }

    #[test]
    fn stored_parts_round_trip() {
        assert_eq!(Asset::from_parts("XLM", ""), Asset::Native);
        let issued = Asset::from_parts("AQUA", ISSUER);
        assert_eq!(Asset::from_parts(issued.code(), issued.issuer()), issued);
    }

    #[test]
    fn short_form_abbreviates_issuer() {
        let asset = Asset::credit("AQUA", ISSUER);
        assert_eq!(asset.short(), "AQUA:GBNZ...AQUA");
        assert_eq!(Asset::Native.short(), "XLM");
    }

    #[test]
    fn xdr_round_trip() {
        let asset = Asset::credit("AQUA", ISSUER);
        let xdr = asset.to_xdr().unwrap();
        assert_eq!(Asset::from_xdr(&xdr), asset);
    }
}
