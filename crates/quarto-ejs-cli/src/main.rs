/*
 * main.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Command-line front end for the EJS template compiler
 */

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::GlobalArgs;
use commands::render::RenderArgs;

#[derive(Parser)]
#[command(name = "quarto-ejs")]
#[command(version)]
#[command(about = "Compile and render EJS templates", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalFlags,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalFlags {
    /// Project configuration file (defaults to ejs.yml next to the template)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Tag delimiter character
    #[arg(long, global = true)]
    delimiter: Option<char>,

    /// Strip leading and trailing whitespace on every line
    #[arg(long, global = true)]
    trim_whitespace: bool,

    /// Do not annotate runtime errors with source context
    #[arg(long, global = true)]
    no_compile_diagnostics: bool,

    /// Log the generated source
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template
    Render {
        /// Template file
        input: PathBuf,

        /// Data context as inline JSON
        #[arg(long, conflicts_with = "data_file")]
        data: Option<String>,

        /// Data context file (JSON, or YAML with a .yml/.yaml extension)
        #[arg(long)]
        data_file: Option<PathBuf>,

        /// Print output and extracted blocks as JSON
        #[arg(long)]
        blocks: bool,

        /// Write output to FILE instead of stdout
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Print the generated source of a template
    Compile {
        /// Template file
        input: PathBuf,
    },

    /// Print build-tool code for a template (directives are dropped)
    Prebuild {
        /// Template file
        input: PathBuf,
    },

    /// Print the dependency metadata of a template as JSON
    Deps {
        /// Template file
        input: PathBuf,
    },

    /// List the asset markers in rendered output
    Markers {
        /// Rendered output file
        input: PathBuf,

        /// Remove the markers and print the remaining text with them
        #[arg(long)]
        strip: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.global.debug {
        "quarto_ejs=debug"
    } else {
        "quarto_ejs=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let global = GlobalArgs {
        config: cli.global.config,
        delimiter: cli.global.delimiter,
        trim_whitespace: cli.global.trim_whitespace,
        no_compile_diagnostics: cli.global.no_compile_diagnostics,
        debug: cli.global.debug,
    };

    match cli.command {
        Commands::Render {
            input,
            data,
            data_file,
            blocks,
            output,
        } => commands::render::execute(
            &global,
            &RenderArgs {
                input,
                data,
                data_file,
                blocks,
                output,
            },
        ),
        Commands::Compile { input } => commands::compile::execute(&global, &input),
        Commands::Prebuild { input } => commands::compile::prebuild(&global, &input),
        Commands::Deps { input } => commands::deps::execute(&global, &input),
        Commands::Markers { input, strip } => commands::deps::markers(&global, &input, strip),
    }
}
