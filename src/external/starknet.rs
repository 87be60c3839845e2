use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::external::market_data::{NetworkProvider, NetworkSnapshot, ProviderError};

/// StarkNet JSON-RPC client, limited to the block reads the metrics job needs.
pub struct StarknetRpcProvider {
    client: reqwest::Client,
    rpc_url: String,
}

impl StarknetRpcProvider {
    pub fn new(rpc_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            rpc_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<RpcBlock>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcBlock {
    block_number: u64,
    timestamp: i64,
    l1_gas_price: Option<RpcGasPrice>,
}

#[derive(Debug, Deserialize)]
struct RpcGasPrice {
    price_in_wei: Option<String>,
}

fn parse_block(body: RpcResponse) -> Result<NetworkSnapshot, ProviderError> {
    if let Some(err) = body.error {
        return Err(ProviderError::BadResponse(format!(
            "rpc error {}: {}",
            err.code, err.message
        )));
    }

    let block = body
        .result
        .ok_or_else(|| ProviderError::BadResponse("rpc response missing result".to_string()))?;

    Ok(NetworkSnapshot {
        latest_block: block.block_number,
        block_timestamp: block.timestamp,
        gas_price_wei: block.l1_gas_price.and_then(|g| g.price_in_wei),
    })
}

#[async_trait]
impl NetworkProvider for StarknetRpcProvider {
    async fn fetch_snapshot(&self) -> Result<NetworkSnapshot, ProviderError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": "starknet_getBlockWithTxHashes",
            "params": ["latest"],
            "id": 1,
        });

        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ProviderError::BadResponse(format!(
                "rpc node returned status {}",
                resp.status()
            )));
        }

        let body = resp
            .json::<RpcResponse>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        parse_block(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_block() {
        let body: RpcResponse = serde_json::from_str(
            r#"{
                "jsonrpc": "2.0",
                "id": 1,
                "result": {
                    "block_number": 641203,
                    "timestamp": 1722470400,
                    "l1_gas_price": { "price_in_wei": "0x5f5e100" }
                }
            }"#,
        )
        .unwrap();

        let snap = parse_block(body).unwrap();
        assert_eq!(snap.latest_block, 641203);
        assert_eq!(snap.block_timestamp, 1722470400);
        assert_eq!(snap.gas_price_wei.as_deref(), Some("0x5f5e100"));
    }

    #[test]
    fn test_parse_block_surfaces_rpc_error() {
        let body: RpcResponse = serde_json::from_str(
            r#"{ "jsonrpc": "2.0", "id": 1, "error": { "code": 24, "message": "Block not found" } }"#,
        )
        .unwrap();

        let err = parse_block(body).unwrap_err();
        assert!(matches!(err, ProviderError::BadResponse(_)));
    }
}
