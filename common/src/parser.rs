//! AIレスポンスパーサー
//!
//! 解析CLIなどのレスポンスからJSONを抽出し、AnalysisResultをパースする

use crate::error::{Error, Result};
use crate::types::AnalysisResult;

/// レスポンスからJSON部分を抽出
///
/// 抽出優先順位:
/// 1. ```json ... ``` ブロック
/// 2. 生の {...} オブジェクト
/// 3. エラー
///
/// # Examples
/// ```
/// use inspection_common::extract_json;
///
/// let response = "Result: {\"description\": \"ok\"}";
/// let json = extract_json(response).unwrap();
/// assert_eq!(json, "{\"description\": \"ok\"}");
/// ```
pub fn extract_json(response: &str) -> Result<&str> {
    // ```json ... ``` ブロックを探す
    if let Some(start_marker) = response.find("```json") {
        let start = start_marker + 7; // "```json" の長さ
        if let Some(end_offset) = response[start..].find("```") {
            let end = start + end_offset;
            return Ok(response[start..end].trim());
        }
    }

    // 生の {...} を探す
    if let Some(start) = response.find('{') {
        if let Some(end) = response.rfind('}') {
            if end >= start {
                return Ok(&response[start..=end]);
            }
        }
    }

    Err(Error::Parse("no JSON object in response".into()))
}

/// 解析レスポンスをパース
///
/// 1コンポーネント分の全画像に対する1つの結果を返す
pub fn parse_analysis_response(response: &str) -> Result<AnalysisResult> {
    let json_str = extract_json(response)?;
    serde_json::from_str(json_str.trim())
        .map_err(|e| Error::Parse(format!("analysis JSON: {}", e)))
}
