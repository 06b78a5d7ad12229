//! icystream-fetch — fetch an HTTP audio stream to a file or stdout

use std::fs::File;
use std::io::{self, SeekFrom, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use icystream::{HttpInput, Reactor};

#[derive(Parser)]
#[command(name = "icystream-fetch", about = "Fetch an HTTP audio stream", version)]
struct Cli {
    /// Stream URL to fetch
    url: String,

    /// Write the stream to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Stop after fetching this many bytes
    #[arg(long)]
    max_bytes: Option<u64>,

    /// Start at this byte offset (requires range support on the server)
    #[arg(long)]
    seek: Option<u64>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let reactor = match Reactor::new() {
        Ok(reactor) => reactor,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let mut stream = match HttpInput::open(&reactor.handle(), &cli.url) {
        Ok(Some(stream)) => stream,
        Ok(None) => {
            eprintln!("Error: not an http:// URL: {}", cli.url);
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run(&mut stream, &cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(stream: &mut HttpInput, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout().lock()),
    };

    if let Some(offset) = cli.seek {
        stream.seek(SeekFrom::Start(offset))?;
    }

    let mut info_shown = false;
    let mut total: u64 = 0;
    let mut buf = [0u8; 8 * 1024];

    loop {
        let budget = match cli.max_bytes {
            Some(max) => (max - total).min(buf.len() as u64) as usize,
            None => buf.len(),
        };
        if budget == 0 {
            break;
        }

        let n = stream.read(&mut buf[..budget])?;
        if n == 0 {
            break;
        }

        if !info_shown {
            info_shown = true;
            if let Some(mime) = stream.mime() {
                eprintln!("content type: {mime}");
            }
            if let Some(size) = stream.size() {
                eprintln!("size: {size} bytes");
            }
        }

        if let Some(tag) = stream.tag() {
            if let Some(name) = &tag.name {
                eprintln!("station: {name}");
            }
            if let Some(title) = &tag.title {
                eprintln!("now playing: {title}");
            }
        }

        out.write_all(&buf[..n])?;
        total += n as u64;
    }

    out.flush()?;
    eprintln!("{total} bytes fetched");
    Ok(())
}
