use clap::{Parser, Subcommand};
use inspection_common::Condition;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "inspection-sync")]
#[command(about = "物件点検の画像解析・ドキュメント同期ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 空の点検ドキュメントを作成
    Init {
        /// レポートID
        report: String,

        /// メインの部屋ID
        #[arg(long)]
        room: String,

        /// 初期コンポーネント（id=名前、複数指定可）
        #[arg(short, long = "component", value_parser = parse_component_spec)]
        components: Vec<(String, String)>,

        /// 既存のドキュメントを上書き
        #[arg(long)]
        force: bool,
    },

    /// 画像をステージングしてアップロード・AI解析・保存
    Analyze {
        /// レポートID
        report: String,

        /// 部屋ID
        #[arg(long)]
        room: String,

        /// 部屋の種類（プロンプトに使用）
        #[arg(long, default_value = "room")]
        room_type: String,

        /// コンポーネントID
        #[arg(short, long)]
        component: String,

        /// コンポーネント名（デフォルト: ID）
        #[arg(short, long)]
        name: Option<String>,

        /// 物件ラベル（保存先メタデータ）
        #[arg(long, default_value = "")]
        property: String,

        /// 画像ファイル
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },

    /// コンポーネントの更新をキューに積んで保存
    Update {
        /// レポートID
        report: String,

        /// コンポーネントID
        #[arg(short, long)]
        component: String,

        /// 説明文
        #[arg(short, long)]
        description: Option<String>,

        /// 状態評価 (excellent/good/fair/poor/needs_replacement)
        #[arg(long)]
        condition: Option<Condition>,
    },

    /// ドキュメントを表示
    Show {
        /// レポートID
        report: String,

        /// 指定コンポーネントのみ表示
        #[arg(short, long)]
        component: Option<String>,
    },

    /// 設定を管理
    Config {
        /// 設定を表示
        #[arg(long)]
        show: bool,

        /// 値を設定（key=value）
        #[arg(long, value_parser = parse_key_value)]
        set: Option<(String, String)>,
    },
}

impl Cli {
    /// RUST_LOG未設定時のログフィルタ
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

fn parse_component_spec(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((id, name)) if !id.trim().is_empty() => Ok((id.trim().to_string(), name.trim().to_string())),
        Some(_) => Err(format!("component id is empty: {}", s)),
        None if !s.trim().is_empty() => Ok((s.trim().to_string(), s.trim().to_string())),
        None => Err("component id is empty".to_string()),
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| format!("expected key=value: {}", s))
}
