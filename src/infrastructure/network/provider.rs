// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use alloy::network::Ethereum;
use alloy::providers::{Provider, RootProvider};
use std::time::Duration;
use url::Url;

pub type HttpProvider = RootProvider<Ethereum>;
pub type WsProvider = RootProvider<Ethereum>;

const WS_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

pub struct ConnectionFactory;

impl ConnectionFactory {
    pub fn http(rpc_url: &str) -> Result<HttpProvider, AppError> {
        let url =
            Url::parse(rpc_url).map_err(|e| AppError::Config(format!("Invalid RPC URL: {}", e)))?;

        Ok(RootProvider::new_http(url))
    }

    /// Opens a fresh websocket connection; every call yields an independent transport.
    pub async fn ws(ws_url: &str) -> Result<WsProvider, AppError> {
        let connect = RootProvider::connect(ws_url);
        match tokio::time::timeout(WS_CONNECT_TIMEOUT, connect).await {
            Ok(Ok(provider)) => Ok(provider),
            Ok(Err(e)) => Err(AppError::Connection(format!("WS Connection failed: {}", e))),
            Err(_) => Err(AppError::Connection(format!(
                "WS Connection timed out after {}s",
                WS_CONNECT_TIMEOUT.as_secs()
            ))),
        }
    }

    /// Reads the chain id and head so misconfigured endpoints fail at startup, not mid-rescue.
    pub async fn probe(provider: &HttpProvider) -> Result<(u64, u64), AppError> {
        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| AppError::Connection(format!("chain_id probe failed: {e}")))?;
        let head = provider
            .get_block_number()
            .await
            .map_err(|e| AppError::Connection(format!("block number probe failed: {e}")))?;
        Ok((chain_id, head))
    }
}
