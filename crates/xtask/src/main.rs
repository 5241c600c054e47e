use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use sevenz_rust2::decompress_file;
use std::fs::{File, create_dir_all};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

#[derive(Parser)]
#[command(version, about = "Helper tool for build and dev tasks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Downloads the lung scan archive
    DownloadScanArchive {
        url: String,
        #[arg(default_value = "data/lung_scans/lung_scans.7z")]
        output: String,
    },
    /// Extracts the archive downloaded before to a given path
    ExtractScanArchive {
        #[arg(default_value = "data/lung_scans/lung_scans.7z")]
        archive_path: String,
        #[arg(default_value = "data/lung_scans")]
        dest: String,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::DownloadScanArchive { url, output } => {
            println!("🔽 downloading {} to {}", url, output);
            match download_archive(&url, &output) {
                Ok(_) => println!("✅ Download successful: {}", output),
                Err(e) => eprintln!("❌ error: {}", e),
            }
        }
        Commands::ExtractScanArchive { archive_path, dest } => {
            println!("📦 Extracting: {} to {}", archive_path, dest);
            match extract_7z(&archive_path, &dest) {
                Ok(_) => println!("✅ Successfully extracted {} to: {}", archive_path, dest),
                Err(e) => eprintln!("❌ Error: {}", e),
            }
        }
    }
}

fn download_archive(url: &str, output: &str) -> Result<()> {
    if let Some(parent) = Path::new(output).parent() {
        create_dir_all(parent)?;
    }
    let client = Client::builder()
        .timeout(Duration::from_secs(300))
        .build()?;

    let mut response = client.get(url).send().context("request failed")?;
    if !response.status().is_success() {
        bail!("server answered with status {}", response.status());
    }

    let total_size = response.content_length().unwrap_or(0);
    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{wide_bar} {bytes}/{total_bytes} ({eta})")?
            .progress_chars("█▉▊▋▌▍▎▏  "),
    );

    let mut dest = File::create(output)?;
    let mut buffer = [0; 8192];
    let mut downloaded = 0;

    while let Ok(n) = response.read(&mut buffer) {
        if n == 0 {
            break;
        }
        dest.write_all(&buffer[..n])?;
        downloaded += n as u64;
        pb.set_position(downloaded);
    }

    pb.finish_with_message("✅ Download finished!");
    Ok(())
}

fn extract_7z(archive_path: &str, dest: &str) -> Result<()> {
    create_dir_all(dest)?;

    println!("📦 Extracting 7z archive to: {}", dest);
    println!("⌛ This may take a while...");

    decompress_file(archive_path, dest)?;

    println!("✅ 7z extraction completed!");
    Ok(())
}
