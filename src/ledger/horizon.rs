// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The Horizon HTTP client. One instance is shared by every job; all calls
//! are plain request/response with categorized errors, no streaming.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::asset::Asset;
use super::error::Error;
use super::provider::LedgerProvider;
use super::tx::SignedEnvelope;
use super::types::{
    AccountRecord, ClaimableBalanceRecord, Page, PathRecord, Problem, TransactionResponse,
};
use crate::config::HorizonConfig;

const NO_QUERY: &[(&str, &str)] = &[];

pub struct HorizonClient {
    http: reqwest::Client,
    base: Url,
}

impl HorizonClient {
    pub fn new(config: &HorizonConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base: config.url.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| Error::invalid("horizon url", self.base.as_str()))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned, Q: serde::Serialize + ?Sized>(
        &self,
        url: Url,
        query: &Q,
    ) -> Result<T, Error> {
        let response = self.http.get(url).query(query).send().await?;
        decode(response).await
    }
}

/// Map a Horizon response onto the gateway error taxonomy; see
/// [`Error`] for how callers treat each category.
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, Error> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(Error::RateLimited);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(Error::NotFound);
    }
    if !status.is_success() {
        let problem = response.json::<Problem>().await.ok();
        let summary = problem
            .as_ref()
            .and_then(|p| p.detail.clone().or_else(|| p.title.clone()))
            .unwrap_or_else(|| "no problem document".to_string());
        let result_codes = problem.and_then(|p| p.extras).and_then(|e| e.result_codes);
        return Err(Error::Status {
            status: status.as_u16(),
            summary,
            result_codes,
        });
    }
    Ok(response.json::<T>().await?)
}

fn asset_params(prefix: &str, asset: &Asset) -> Vec<(String, String)> {
    let mut params = vec![(format!("{prefix}_type"), asset.horizon_type().to_string())];
    if !asset.is_native() {
        params.push((format!("{prefix}_code"), asset.code().to_string()));
        params.push((format!("{prefix}_issuer"), asset.issuer().to_string()));
    }
    params
}

#[async_trait]
impl LedgerProvider for HorizonClient {
    async fn get_account(&self, address: &str) -> Result<AccountRecord, Error> {
        let url = self.endpoint(&["accounts", address])?;
        self.get_json(url, NO_QUERY).await
    }

    async fn claimable_balances_for_claimant(
        &self,
        claimant: &str,
        cursor: Option<&str>,
        limit: u32,
        ascending: bool,
    ) -> Result<Vec<ClaimableBalanceRecord>, Error> {
        let url = self.endpoint(&["claimable_balances"])?;
        let mut query = vec![
            ("claimant", claimant.to_string()),
            ("limit", limit.to_string()),
            ("order", if ascending { "asc" } else { "desc" }.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        let page: Page<ClaimableBalanceRecord> = self.get_json(url, &query).await?;
        Ok(page.into_records())
    }

    async fn claimable_balances_for_asset(
        &self,
        asset: &Asset,
        claimant: Option<&str>,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Vec<ClaimableBalanceRecord>, Error> {
        let url = self.endpoint(&["claimable_balances"])?;
        let mut query = vec![
            ("asset", asset.to_horizon()),
            ("limit", limit.to_string()),
            ("order", "asc".to_string()),
        ];
        if let Some(claimant) = claimant {
            query.push(("claimant", claimant.to_string()));
        }
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        let page: Page<ClaimableBalanceRecord> = self.get_json(url, &query).await?;
        Ok(page.into_records())
    }

    async fn accounts_holding(
        &self,
        asset: &Asset,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Vec<AccountRecord>, Error> {
        let url = self.endpoint(&["accounts"])?;
        let mut query = vec![
            ("asset", asset.to_horizon()),
            ("limit", limit.to_string()),
            ("order", "asc".to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        let page: Page<AccountRecord> = self.get_json(url, &query).await?;
        Ok(page.into_records())
    }

    async fn strict_receive_paths(
        &self,
        source: &Asset,
        dest: &Asset,
        dest_amount: &BigDecimal,
    ) -> Result<Vec<PathRecord>, Error> {
        let url = self.endpoint(&["paths", "strict-receive"])?;
        let mut query = vec![
            ("source_assets".to_string(), source.to_horizon()),
            ("destination_amount".to_string(), dest_amount.to_string()),
        ];
        query.extend(asset_params("destination_asset", dest));
        let page: Page<PathRecord> = self.get_json(url, &query).await?;
        Ok(page.into_records())
    }

    async fn strict_send_paths(
        &self,
        source: &Asset,
        source_amount: &BigDecimal,
        dest: &Asset,
    ) -> Result<Vec<PathRecord>, Error> {
        let url = self.endpoint(&["paths", "strict-send"])?;
        let mut query = vec![
            ("destination_assets".to_string(), dest.to_horizon()),
            ("source_amount".to_string(), source_amount.to_string()),
        ];
        query.extend(asset_params("source_asset", source));
        let page: Page<PathRecord> = self.get_json(url, &query).await?;
        Ok(page.into_records())
    }

    async fn submit(&self, envelope: &SignedEnvelope) -> Result<TransactionResponse, Error> {
        let url = self.endpoint(&["transactions"])?;
        let response = self
            .http
            .post(url)
            .form(&[("tx", envelope.base64.as_str())])
            .send()
            .await?;
        decode(response).await
    }

    async fn get_transaction(&self, hash: &str) -> Result<TransactionResponse, Error> {
        let url = self.endpoint(&["transactions", hash])?;
        self.get_json(url, NO_QUERY).await
    }
}
