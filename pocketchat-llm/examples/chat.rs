use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use pocketchat_llm::chat::Conversation;
use pocketchat_llm::config::{ModelConfig, ModelSpec};
use pocketchat_llm::prompt::{Intent, PromptBuilder};
use pocketchat_llm::serve::{Message, ScriptedLoader};
use pocketchat_llm::tokenizer::{Tokenizer, TokenizerOptions, UnknownTokenPolicy};
use pocketchat_llm::utils::get_tokenizer_file;

#[derive(Parser, Debug)]
#[command(version, about = "Tokenizer and prompt tooling for on-device chat models")]
struct Args {
    /// Path to a tokenizer.json
    #[arg(short = 't', long)]
    tokenizer: Option<PathBuf>,

    /// Fetch tokenizer.json from this Huggingface Hub repo instead
    #[arg(long, default_value = "Qwen/Qwen3-0.6B")]
    hub_repo: String,

    /// Model preset (qwen3, qwen2.5) or a path to a model spec JSON file
    #[arg(short = 'm', long, default_value = "qwen3")]
    model: String,

    /// Fail on characters the vocabulary cannot represent instead of dropping them
    #[arg(long)]
    strict: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the token ids of a text
    Encode {
        text: String,
        /// Frame the ids with the sequence start and end tokens
        #[arg(short = 's', long)]
        special: bool,
    },
    /// Print the text of comma-separated token ids
    Decode { ids: String },
    /// Print the prompt ids built for a single user message
    Prompt {
        text: String,
        /// Leave thinking mode on
        #[arg(long)]
        think: bool,
    },
    /// Stream a canned reply to a user message through a scripted engine
    Replay {
        text: String,
        /// Comma-separated ids the engine will produce
        #[arg(short = 'r', long)]
        reply: String,
        #[arg(long)]
        think: bool,
    },
}

fn parse_ids(ids: &str) -> Result<Vec<u32>> {
    ids.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().with_context(|| format!("bad token id {s:?}")))
        .collect()
}

fn model_spec(name: &str) -> Result<ModelSpec> {
    match name {
        "qwen3" => Ok(ModelSpec::qwen3()),
        "qwen2.5" | "qwen2_5" => Ok(ModelSpec::qwen2_5()),
        path => ModelSpec::from_file(path).with_context(|| format!("loading model spec {path}")),
    }
}

pub fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let tokenizer_path = match &args.tokenizer {
        Some(path) => path.clone(),
        None => get_tokenizer_file(&args.hub_repo)?,
    };
    let options = TokenizerOptions {
        unknown_policy: if args.strict {
            UnknownTokenPolicy::Fail
        } else {
            UnknownTokenPolicy::Drop
        },
        ..Default::default()
    };
    let tokenizer = Arc::new(Tokenizer::from_file(&tokenizer_path, options)?);

    match args.command {
        Command::Encode { text, special } => {
            println!("{:?}", tokenizer.encode(&text, special)?);
        }
        Command::Decode { ids } => {
            println!("{}", tokenizer.decode(&parse_ids(&ids)?));
        }
        Command::Prompt { text, think } => {
            let config = ModelConfig::resolve(&model_spec(&args.model)?, &tokenizer)?;
            let intent = Intent::with_system_prompt(config.system_prompt(think));
            let ids = PromptBuilder::new(&tokenizer, &config).build(&[Message::user(text)], &intent)?;
            println!("{ids:?}");
            println!("{}", tokenizer.decode(&ids));
        }
        Command::Replay { text, reply, think } => {
            let config = ModelConfig::resolve(&model_spec(&args.model)?, &tokenizer)?;
            let loader = ScriptedLoader(parse_ids(&reply)?);
            let mut conversation = Conversation::load(&loader, Arc::clone(&tokenizer), config)?;

            // Snapshots carry the whole reply so far; print only what is new.
            let mut printed = 0;
            conversation.send(text, think, move |full: &str| {
                if let Some(delta) = full.get(printed..) {
                    print!("{delta}");
                    let _ = std::io::stdout().flush();
                }
                printed = full.len();
            })?;
            if let Some(outcome) = conversation.wait()? {
                println!();
                log::info!(
                    "{:?}: {} tokens shown, {} skipped",
                    outcome.status,
                    outcome.generated_ids.len(),
                    outcome.skipped
                );
            }
        }
    }

    Ok(())
}
