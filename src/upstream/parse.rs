//! Field extraction for the node's JSON envelopes.

use serde_json::Value;

use crate::error::{IndexerError, Result};
use crate::schemas::BlockIdentity;

/// Walk `path` from `root`. A missing or `null` step is reported with the path walked so far.
fn descend<'a>(root: &'a Value, path: &[&str], context: &str) -> Result<&'a Value> {
    let mut cur = root;
    for (i, key) in path.iter().enumerate() {
        cur = match cur.get(key) {
            Some(v) if !v.is_null() => v,
            _ => return Err(IndexerError::field_missing(context, path[..=i].join("."))),
        };
    }
    Ok(cur)
}

fn string_at<'a>(root: &'a Value, path: &[&str], context: &str) -> Result<&'a str> {
    descend(root, path, context)?.as_str().ok_or_else(|| {
        IndexerError::parse(context, format!("`{}` is not a string", path.join(".")))
    })
}

fn height_at(root: &Value, path: &[&str], context: &str) -> Result<u64> {
    let raw = string_at(root, path, context)?;
    raw.trim()
        .parse::<u64>()
        .map_err(|e| IndexerError::parse(context, format!("height {raw:?}: {e}")))
}

/// `result.sync_info.latest_block_height` from `/status`.
pub fn status_height(body: &Value) -> Result<u64> {
    height_at(body, &["result", "sync_info", "latest_block_height"], "status")
}

/// `block.header.height` from the REST latest-block route.
pub fn latest_block_height(body: &Value) -> Result<u64> {
    height_at(body, &["block", "header", "height"], "latest block")
}

/// Length of `result.txs_results`; an explicit `null` counts as zero transactions.
pub fn tx_count(body: &Value) -> Result<u64> {
    const CTX: &str = "block_results";
    let result = descend(body, &["result"], CTX)?;
    match result.get("txs_results") {
        None => Err(IndexerError::field_missing(CTX, "result.txs_results")),
        Some(Value::Null) => Ok(0),
        Some(Value::Array(txs)) => Ok(txs.len() as u64),
        Some(other) => Err(IndexerError::parse(
            CTX,
            format!("unexpected type for txs_results: {}", json_kind(other)),
        )),
    }
}

/// `result.block_id.hash` and `result.block.header.proposer_address` from `/block`.
pub fn block_identity(body: &Value) -> Result<BlockIdentity> {
    const CTX: &str = "block";
    let result = descend(body, &["result"], CTX)?;
    let block_id = string_at(result, &["block_id", "hash"], CTX)?;
    let proposer = string_at(result, &["block", "header", "proposer_address"], CTX)?;
    Ok(BlockIdentity { block_id: block_id.to_string(), proposer: proposer.to_string() })
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
