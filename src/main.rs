//! certstamp CLI
//!
//! Usage:
//!   certstamp generate --name <NAME> --template <ID>
//!   certstamp templates
//!   certstamp previews
//!   certstamp config get <ID>
//!   certstamp config set <ID> <JSON>
//!   certstamp config show
//!
//! Directories come from `CERTSTAMP_*` environment variables (or `.env`).

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use certstamp::{CertificateGenerator, Settings};

#[derive(Parser)]
#[command(name = "certstamp")]
#[command(about = "Stamp recipient names onto PDF certificate templates")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate one certificate
    Generate {
        /// Recipient name as it should appear on the certificate
        #[arg(short, long)]
        name: String,

        /// Template file name, e.g. black_template.pdf
        #[arg(short, long)]
        template: String,
    },
    /// List available templates
    Templates,
    /// Render missing template previews
    Previews,
    /// Read or replace per-template placement
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the stored placement for a template
    Get { template: String },
    /// Replace the whole placement record for a template
    Set { template: String, json: String },
    /// Print every stored placement
    Show,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "certstamp=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env();
    let mut generator = match CertificateGenerator::new(settings) {
        Ok(generator) => generator,
        Err(e) => {
            eprintln!("Error preparing directories: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Generate { name, template } => match generator.generate(&name, &template) {
            Ok(cert) => {
                println!("{}", cert.path.display());
                println!("download as: {}", cert.download_name);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}", e);
                ExitCode::FAILURE
            }
        },
        Command::Templates => {
            let templates = match generator.templates() {
                Ok(templates) => templates,
                Err(e) => {
                    eprintln!("Error listing templates: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            for entry in templates {
                let pages = entry
                    .page_count()
                    .map(|n| n.to_string())
                    .unwrap_or_else(|_| "?".to_string());
                let preview = entry
                    .preview_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{}\t{}\t{} pages\t{}", entry.display_name, entry.id, pages, preview);
            }
            ExitCode::SUCCESS
        }
        Command::Previews => {
            let generated = generator
                .previews()
                .generate_all(&generator.settings().template_dir);
            println!("{} preview(s) generated", generated);
            ExitCode::SUCCESS
        }
        Command::Config { action } => run_config(&mut generator, action),
    }
}

fn run_config(generator: &mut CertificateGenerator, action: ConfigAction) -> ExitCode {
    match action {
        ConfigAction::Get { template } => {
            // Templates without a stored record print an empty object.
            let json = match generator.store().stored(&template) {
                Some(config) => serde_json::to_string_pretty(config),
                None => Ok("{}".to_string()),
            };
            print_json(json)
        }
        ConfigAction::Set { template, json } => {
            match generator.update_placement_json(&template, &json) {
                Ok(()) => {
                    println!("Configuration updated successfully");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("{}", e);
                    ExitCode::FAILURE
                }
            }
        }
        ConfigAction::Show => print_json(serde_json::to_string_pretty(generator.store().entries())),
    }
}

fn print_json(json: serde_json::Result<String>) -> ExitCode {
    match json {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error encoding configuration: {}", e);
            ExitCode::FAILURE
        }
    }
}
