use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use studio_core::{ItemId, MetadataField, OperationKind, OperationParams};
use studio_engine::EngineConfig;
use studio_logging::LogDestination;

#[derive(Parser, Debug)]
#[command(
    name = "studio_app",
    version,
    about = "Headless driver for the listing studio"
)]
pub struct Cli {
    /// Directory holding the stored collection and work files.
    #[arg(long, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Base URL of the image service.
    #[arg(long, value_name = "URL")]
    pub service_url: Option<String>,

    #[arg(long, value_enum, default_value_t = LogTarget::Terminal)]
    pub log: LogTarget,

    /// Log progress at info level.
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogTarget {
    Terminal,
    File,
    Both,
}

impl From<LogTarget> for LogDestination {
    fn from(target: LogTarget) -> Self {
        match target {
            LogTarget::Terminal => LogDestination::Terminal,
            LogTarget::File => LogDestination::File,
            LogTarget::Both => LogDestination::Both,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add image files to the collection.
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Run one operation on the selected items.
    Run {
        operation: OperationKind,
        #[command(flatten)]
        selection: Selection,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Upscale, remove the background and scale, stopping at the first failure.
    PrintReady {
        #[command(flatten)]
        selection: Selection,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Step one operation back.
    Undo { id: ItemId },
    /// Drop every processing result and return to the original.
    Revert { id: ItemId },
    Delete { id: ItemId },
    /// Edit one listing field.
    Set {
        id: ItemId,
        #[arg(value_parser = parse_field)]
        field: MetadataField,
        value: String,
    },
    List,
    /// Show how much storage the collection uses.
    Quota,
    /// Remove every item, the stored collection and server-side outputs.
    Clear,
    /// Probe the image service.
    Health,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Every item in the collection.
    #[arg(long, conflicts_with = "ids")]
    pub all: bool,
    #[arg(required_unless_present = "all")]
    pub ids: Vec<ItemId>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ParamArgs {
    /// Free-text instruction for AI edits.
    #[arg(long)]
    pub instruction: Option<String>,
    #[arg(long)]
    pub scale: Option<u32>,
    #[arg(long)]
    pub provider: Option<String>,
    /// Generate only this listing field.
    #[arg(long, value_parser = parse_field)]
    pub field: Option<MetadataField>,
}

impl ParamArgs {
    pub fn to_params(&self) -> OperationParams {
        OperationParams {
            provider: self.provider.clone(),
            scale_factor: self.scale,
            instruction: self.instruction.clone(),
            color: None,
            field: self.field,
        }
    }
}

fn parse_field(name: &str) -> Result<MetadataField, String> {
    MetadataField::parse(name).ok_or_else(|| {
        let known: Vec<&str> = MetadataField::ALL.iter().map(|field| field.as_str()).collect();
        format!("unknown field `{name}`, expected one of: {}", known.join(", "))
    })
}

impl Cli {
    pub fn level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Info
        } else {
            LevelFilter::Warn
        }
    }

    /// Defaults, then `STUDIO_*` variables, then flags.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = EngineConfig::default();
        config
            .apply_env()
            .context("invalid STUDIO_* environment variable")?;
        if let Some(dir) = &self.state_dir {
            config.set_state_dir(dir);
        }
        if let Some(url) = &self.service_url {
            config.service.base_url = url.trim().to_string();
        }
        // Nothing ages notifications in a one-shot run.
        config.tick_interval = std::time::Duration::ZERO;
        Ok(config)
    }
}
