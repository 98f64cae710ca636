use anyhow::{bail, Context};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use inspection_common::{ComponentRecord, InspectionDocument};
use inspection_sync::batch::{BatchRunner, BatchServices, BatchTarget};
use inspection_sync::cli::{Cli, Commands};
use inspection_sync::config::Config;
use inspection_sync::document::{DocumentApi, JsonDocumentStore};
use inspection_sync::gateway::{ComponentGateway, PendingUpdate, RoomSaver};
use inspection_sync::progress::ProgressTracker;
use inspection_sync::services::{LocalImageStorage, TracingNotifier};
use inspection_sync::session::InspectionSession;
use inspection_sync::analyzer::CliAnalyzer;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = cli.log_filter();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load().context("failed to load config")?;

    match cli.command {
        Commands::Init { report, room, components, force } => {
            let api = document_api(&config)?;
            let mut doc = InspectionDocument::new(room.as_str());
            doc.components = components
                .into_iter()
                .map(|(id, name)| ComponentRecord {
                    id,
                    name,
                    ..Default::default()
                })
                .collect();
            api.create_document(&report, &doc, force).await?;
            println!("✔ レポートを作成: {} ({}件のコンポーネント)", report, doc.components.len());
        }

        Commands::Analyze { report, room, room_type, component, name, property, images } => {
            println!("📸 inspection-sync - 画像解析\n");
            config.validate()?;

            let session = build_session(&config, &report)?;
            let images: Vec<String> = images.iter().map(|p| p.display().to_string()).collect();
            let name = name.unwrap_or_else(|| component.clone());

            println!("[1/2] {}枚の画像をステージング", images.len());
            session.stage_images(&component, &name, &images);

            println!("[2/2] アップロード・解析中...");
            let target = BatchTarget {
                report_id: report.clone(),
                room_id: room.clone(),
                room_type,
                property_label: property,
                room_label: room,
            };

            let pb = ProgressBar::new(100);
            pb.set_style(
                ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );

            let run = session.process_staged(&target);
            tokio::pin!(run);
            let outcome = loop {
                tokio::select! {
                    outcome = &mut run => break outcome,
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {
                        let overall = session.overall_progress();
                        pb.set_position(overall.percentage as u64);
                        pb.set_message(format!("{:?}", overall.phase));
                    }
                }
            };
            pb.finish_and_clear();

            for result in &outcome.results {
                println!(
                    "✔ {}: {}枚 / 評価 {}",
                    result.component_id,
                    result.images.len(),
                    result.analysis.condition.rating
                );
            }
            for error in &outcome.errors {
                println!("✘ {}: {}", error.component_id, error.error);
            }
            if !outcome.is_complete_success() {
                bail!("{}件のコンポーネントが失敗しました", outcome.errors.len());
            }
            println!("\n✅ 完了");
        }

        Commands::Update { report, component, description, condition } => {
            if description.is_none() && condition.is_none() {
                bail!("--description または --condition を指定してください");
            }
            let session = build_session(&config, &report)?;
            session.queue_component_update(PendingUpdate {
                component_id: component.clone(),
                description,
                condition,
                ..Default::default()
            });
            let saved = session.force_save().await?;
            println!("✔ {}件の更新を保存 ({})", saved, component);
        }

        Commands::Show { report, component } => {
            let api = document_api(&config)?;
            let doc = api.get_document(&report).await?;
            let json = match component {
                Some(id) => {
                    let found = doc
                        .find_component(&id)
                        .with_context(|| format!("component not found: {}", id))?;
                    serde_json::to_string_pretty(found)?
                }
                None => serde_json::to_string_pretty(&doc)?,
            };
            println!("{}", json);
        }

        Commands::Config { show, set } => {
            let mut config = config;

            if let Some((key, value)) = set {
                config.set_value(&key, &value)?;
                config.save()?;
                println!("✔ {} を設定しました", key);
            }

            if show {
                println!("設定:");
                println!("  データディレクトリ: {}", config.resolve_data_dir()?.display());
                println!("  最大並列数: {}", config.max_concurrency);
                println!("  コンポーネント保存待ち: {}ms", config.component_debounce_ms);
                println!("  部屋保存待ち: {}ms", config.room_debounce_ms);
                println!("  解析コマンド: {}", config.analyzer_command);
                println!(
                    "  リトライ: storage {}回 / batch {}回",
                    config.storage_retry.max_attempts, config.batch_retry.max_attempts
                );
            }
        }
    }

    Ok(())
}

fn document_api(config: &Config) -> anyhow::Result<DocumentApi> {
    let store = JsonDocumentStore::new(config.documents_dir()?);
    Ok(DocumentApi::new(Arc::new(store)))
}

fn build_session(config: &Config, report_id: &str) -> anyhow::Result<InspectionSession> {
    let api = document_api(config)?;
    let storage = Arc::new(LocalImageStorage::new(config.images_dir()?));
    let notifier = Arc::new(TracingNotifier);

    let services = BatchServices {
        uploader: storage.clone(),
        records: storage,
        analyzer: Arc::new(CliAnalyzer::new(config.analyzer_command.clone())),
        documents: api.clone(),
        notifier: notifier.clone(),
    };
    let runner = BatchRunner::new(services, ProgressTracker::new())
        .with_max_concurrency(config.max_concurrency)
        .with_retry_configs(config.storage_retry.clone(), config.batch_retry.clone());
    let gateway = ComponentGateway::new(
        api.clone(),
        config.storage_retry.clone(),
        config.component_debounce(),
        notifier,
    );
    let rooms = RoomSaver::new(api, report_id, config.storage_retry.clone(), config.room_debounce());

    Ok(InspectionSession::new(report_id, runner, gateway, rooms))
}
