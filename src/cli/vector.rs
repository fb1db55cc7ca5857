//! `ai-rails vector` command
//!
//! Semantic search over workflow artifacts.
//!
//! # Usage
//! ```bash
//! ai-rails vector index wf-1 tests generated_tests.py
//! ai-rails vector search "email validation edge cases" --kind tests
//! ai-rails vector fetch wf-1:tests
//! ai-rails vector delete wf-1:tests wf-1:code
//! ```

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

use super::utils::{embedding_manager, read_input, vector_manager};
use crate::config::Config;
use crate::core::search::{Artifact, ArtifactIndex, ArtifactKind, SearchQuery};

#[derive(Args, Debug)]
pub struct VectorArgs {
    #[command(subcommand)]
    pub command: VectorCommands,
}

#[derive(Subcommand, Debug)]
pub enum VectorCommands {
    /// Embed and store an artifact
    Index {
        workflow_id: String,

        /// plan, tests, code or review
        kind: ArtifactKind,

        /// Content or file path
        content: String,
    },

    /// Search artifacts by meaning
    Search {
        query: String,

        #[arg(short, long)]
        kind: Option<ArtifactKind>,

        #[arg(short, long)]
        workflow: Option<String>,

        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Drop hits scoring below this
        #[arg(long)]
        min_score: Option<f32>,

        #[arg(long)]
        json: bool,
    },

    /// Fetch vectors by ID
    Fetch {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Delete vectors by ID
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

pub async fn execute(args: VectorArgs, config: &Config) -> Result<()> {
    if !config.vector.enabled {
        anyhow::bail!("Vector search is disabled (ENABLE_VECTOR_SEARCH=false)");
    }
    let vectors = vector_manager(config)?;
    if vectors.mode() == "memory" {
        eprintln!(
            "{} No Upstash Vector credentials, using in-memory index (nothing persists)",
            "⚠".yellow()
        );
    }

    match args.command {
        VectorCommands::Index {
            workflow_id,
            kind,
            content,
        } => {
            let embeddings = embedding_manager(config);
            if embeddings.is_placeholder() {
                eprintln!(
                    "{} No OpenAI API key, using placeholder embeddings",
                    "⚠".yellow()
                );
            }
            let content = read_input(&content)?;
            let index = ArtifactIndex::new(&vectors, &embeddings);
            let artifact = Artifact {
                workflow_id: &workflow_id,
                kind,
                content: &content,
            };
            match index.index(&artifact).await {
                Some(id) => println!("{} Indexed {}", "✓".green(), id.cyan()),
                None => anyhow::bail!("Nothing indexed for {}", artifact.id()),
            }
        }
        VectorCommands::Search {
            query,
            kind,
            workflow,
            limit,
            min_score,
            json,
        } => {
            let embeddings = embedding_manager(config);
            let index = ArtifactIndex::new(&vectors, &embeddings);

            let mut search = SearchQuery::new(query).with_limit(limit);
            if let Some(kind) = kind {
                search = search.with_kind(kind);
            }
            if let Some(workflow) = workflow {
                search = search.with_workflow(workflow);
            }
            if let Some(min) = min_score {
                search = search.with_min_score(min);
            }

            let results = index.search(&search).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
                return Ok(());
            }
            if results.is_empty() {
                println!("No results found.");
                return Ok(());
            }
            for (i, hit) in results.iter().enumerate() {
                println!(
                    "{}. {} ({:.3})",
                    i + 1,
                    hit.id.cyan().bold(),
                    hit.score
                );
                if let Some(preview) = &hit.preview {
                    println!("   {}", preview.replace('\n', " ").dimmed());
                }
            }
        }
        VectorCommands::Fetch { ids } => {
            let records = vectors.fetch(&ids).await;
            if records.is_empty() {
                println!("No vectors found.");
            }
            for record in records {
                println!(
                    "{} ({} dims)",
                    record.id.cyan().bold(),
                    record.vector.len()
                );
                println!("{}", serde_json::to_string_pretty(&record.metadata)?);
            }
        }
        VectorCommands::Delete { ids } => {
            if !vectors.delete(&ids).await {
                anyhow::bail!("Failed to delete vectors");
            }
            println!("{} Deleted {} vector(s)", "✓".green(), ids.len());
        }
    }
    Ok(())
}
