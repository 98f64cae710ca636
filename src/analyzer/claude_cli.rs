//! AI CLI連携モジュール
//!
//! `<command> -p <prompt> --output-format text` を実行し、
//! レスポンスからAnalysisResultを取り出す。
//! 画像はローカルパスとしてプロンプトに列挙する。

use crate::error::{InspectionError, Result};
use crate::services::{AnalysisOptions, Analyzer};
use async_trait::async_trait;
use inspection_common::{build_analysis_prompt, parse_analysis_response, AnalysisResult};
use tokio::process::Command;
use tracing::debug;

pub struct CliAnalyzer {
    command: String,
}

impl CliAnalyzer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// プロンプト構築（改行をスペースに置換してコマンド引数で渡す）
    pub fn build_prompt(image_refs: &[String], room_type: &str, component_name: &str) -> String {
        let image_list = image_refs
            .iter()
            .map(|p| p.replace('\\', "/"))
            .collect::<Vec<_>>()
            .join(", ");
        let body = build_analysis_prompt(room_type, component_name, image_refs.len());
        format!("Read the following image files: {}\n\n{}", image_list, body).replace('\n', " ")
    }

    async fn run(&self, prompt: &str) -> Result<String> {
        #[cfg(windows)]
        let output = Command::new("cmd")
            .args(["/c", &self.command, "-p", prompt, "--output-format", "text"])
            .output()
            .await;

        #[cfg(not(windows))]
        let output = Command::new(&self.command)
            .args(["-p", prompt, "--output-format", "text"])
            .output()
            .await;

        let output = output
            .map_err(|e| InspectionError::CliExecution(format!("{}: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InspectionError::Analysis(format!(
                "{} failed (code {:?}): {}",
                self.command,
                output.status.code(),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl Analyzer for CliAnalyzer {
    async fn analyze(
        &self,
        image_refs: &[String],
        room_type: &str,
        component_name: &str,
        options: &AnalysisOptions,
    ) -> Result<AnalysisResult> {
        if image_refs.is_empty() {
            return Err(InspectionError::Validation(format!(
                "no images to analyze for {}",
                options.component_id
            )));
        }

        let prompt = Self::build_prompt(image_refs, room_type, component_name);
        debug!(
            component_id = %options.component_id,
            images = image_refs.len(),
            prompt_len = prompt.len(),
            "Invoking analysis CLI"
        );

        let response = self.run(&prompt).await?;
        debug!(response_len = response.len(), "Analysis CLI responded");

        Ok(parse_analysis_response(&response)?)
    }
}
