mod claude_cli;

pub use claude_cli::CliAnalyzer;
